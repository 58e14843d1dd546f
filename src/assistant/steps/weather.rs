use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{info, warn};

use crate::assistant::context::{WeatherResult, WorkflowContext};
use crate::assistant::{FORMAT, WEATHER, prompts};
use crate::integrations::WeatherProvider;
use crate::llm::{LanguageModel, Prompt, generate_structured};
use crate::workflow::{Step, StepError, Transition};

#[derive(Debug, Deserialize)]
struct CityExtraction {
    #[serde(default)]
    city: Option<String>,
}

/// Current conditions for the city named in the request, or the user's
/// home city.
pub struct WeatherStep {
    llm: Arc<dyn LanguageModel>,
    provider: Arc<dyn WeatherProvider>,
}

impl WeatherStep {
    pub fn new(llm: Arc<dyn LanguageModel>, provider: Arc<dyn WeatherProvider>) -> Self {
        Self { llm, provider }
    }

    async fn requested_city(&self, request: &str) -> Option<String> {
        let prompt = Prompt::new(prompts::WEATHER_CITY, request).with_schema(prompts::city_schema());
        match generate_structured::<CityExtraction>(self.llm.as_ref(), prompt).await {
            Ok(extracted) => extracted.city.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            Err(e) => {
                warn!("City extraction failed: {}", e);
                None
            }
        }
    }

    async fn lookup(&self, city: &str) -> WeatherResult {
        let location = match self.provider.geocode(city).await {
            Ok(Some(location)) => location,
            Ok(None) => {
                return WeatherResult::Unavailable(format!(
                    "I couldn't find location data for '{city}' in the weather database."
                ));
            }
            Err(e) => {
                warn!("Geocoding '{}' failed: {}", city, e);
                return WeatherResult::Unavailable("The weather service isn't answering right now.".to_string());
            }
        };

        match self.provider.current(&location).await {
            Ok(now) => WeatherResult::Forecast(format!(
                "The current weather in {} is {}°C ({}) with wind at {} km/h.",
                location.name,
                now.temperature,
                now.description(),
                now.windspeed
            )),
            Err(e) => {
                warn!("Weather for {} failed: {}", location.name, e);
                WeatherResult::Unavailable(format!("I couldn't get the weather for {} right now.", location.name))
            }
        }
    }
}

impl Step<WorkflowContext> for WeatherStep {
    fn name(&self) -> &'static str {
        WEATHER
    }

    fn successors(&self) -> &'static [&'static str] {
        &[FORMAT]
    }

    fn run<'a>(&'a self, ctx: &'a mut WorkflowContext) -> BoxFuture<'a, Result<Transition, StepError>> {
        Box::pin(async move {
            let city = match self.requested_city(ctx.request()).await {
                Some(city) => Some(city),
                None => ctx.user.home_city.clone().filter(|c| !c.trim().is_empty()),
            };

            let result = match city {
                Some(city) => {
                    info!("🌦️ Weather for {}", city);
                    self.lookup(&city).await
                }
                None => WeatherResult::CityNotFound,
            };
            ctx.weather.fill(result)?;
            Ok(Transition::Next(FORMAT))
        })
    }
}
