//! Command dispatch
//!
//! Deterministic intent classification and the actions behind it. Rules run
//! before any model call, so a recognized command never costs an inference
//! round trip; replies coming back from a model pass through the same rules.

pub mod home;
pub mod weather;

pub use home::{EntityBinding, HomeAction, HomeAssistantClient};
pub use weather::{WeatherClient, WeatherReport};

/// What a command asks the assistant to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Act on a device through Home Assistant
    HomeAutomation {
        /// Service to invoke
        action: HomeAction,
        /// Matched device, when the command named one we know
        device: Option<EntityBinding>,
    },

    /// Report current weather conditions
    Weather,
}

impl Intent {
    /// Stable label used in events and logs
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::HomeAutomation { .. } => "home_automation",
            Self::Weather => "weather",
        }
    }
}

/// Result of dispatching an intent, always speakable
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Sentence to read back to the user
    pub spoken: String,

    /// Whether the underlying action succeeded
    pub success: bool,
}

#[derive(Debug, Clone, Copy)]
enum RuleKind {
    Home(HomeAction),
    Weather,
}

/// Trigger words checked in order; the first hit decides the intent
const RULES: [(&str, RuleKind); 4] = [
    ("turn on", RuleKind::Home(HomeAction::TurnOn)),
    ("turn off", RuleKind::Home(HomeAction::TurnOff)),
    ("toggle", RuleKind::Home(HomeAction::Toggle)),
    ("weather", RuleKind::Weather),
];

/// Ordered intent rules over the configured device bindings
#[derive(Debug, Clone)]
pub struct IntentRules {
    entities: Vec<EntityBinding>,
}

impl IntentRules {
    /// Build the rule set
    ///
    /// Device phrases keep their configuration order, which is also their
    /// matching precedence.
    #[must_use]
    pub fn new(entities: Vec<EntityBinding>) -> Self {
        let entities = entities
            .into_iter()
            .map(|binding| EntityBinding {
                phrase: binding.phrase.to_lowercase(),
                entity_id: binding.entity_id,
            })
            .collect();

        Self { entities }
    }

    /// Classify a command or model reply
    ///
    /// Returns `None` when no rule matches, meaning the text is conversation
    /// rather than a command.
    #[must_use]
    pub fn classify(&self, text: &str) -> Option<Intent> {
        let text = text.to_lowercase();

        for (trigger, kind) in RULES {
            if !text.contains(trigger) {
                continue;
            }

            return Some(match kind {
                RuleKind::Home(action) => Intent::HomeAutomation {
                    action,
                    device: self.find_device(&text),
                },
                RuleKind::Weather => Intent::Weather,
            });
        }

        None
    }

    /// First configured binding whose phrase appears in the text
    fn find_device(&self, text: &str) -> Option<EntityBinding> {
        self.entities
            .iter()
            .find(|binding| text.contains(&binding.phrase))
            .cloned()
    }
}

/// Classifies commands and carries them out
pub struct Dispatcher {
    rules: IntentRules,
    home: HomeAssistantClient,
    weather: WeatherClient,
}

impl Dispatcher {
    /// Create a dispatcher over the given clients
    #[must_use]
    pub const fn new(
        rules: IntentRules,
        home: HomeAssistantClient,
        weather: WeatherClient,
    ) -> Self {
        Self {
            rules,
            home,
            weather,
        }
    }

    /// Classify a command or model reply
    #[must_use]
    pub fn classify(&self, text: &str) -> Option<Intent> {
        self.rules.classify(text)
    }

    /// Carry out an intent
    ///
    /// Never fails outward. Action errors are logged and folded into an
    /// apologetic spoken outcome so the session keeps running.
    pub async fn dispatch(&self, intent: &Intent) -> DispatchOutcome {
        match intent {
            Intent::HomeAutomation { action, device } => {
                self.dispatch_home(*action, device.as_ref()).await
            }
            Intent::Weather => self.dispatch_weather().await,
        }
    }

    async fn dispatch_home(
        &self,
        action: HomeAction,
        device: Option<&EntityBinding>,
    ) -> DispatchOutcome {
        let Some(device) = device else {
            return DispatchOutcome {
                spoken: "I heard a device command, but I don't know that device.".to_string(),
                success: false,
            };
        };

        match self.home.call(action, &device.entity_id).await {
            Ok(()) => DispatchOutcome {
                spoken: format!("{} {}.", device.phrase, action.spoken()),
                success: true,
            },
            Err(e) => {
                tracing::error!(error = %e, entity_id = %device.entity_id, "home automation call failed");
                DispatchOutcome {
                    spoken: "Sorry, I couldn't reach the home automation hub.".to_string(),
                    success: false,
                }
            }
        }
    }

    async fn dispatch_weather(&self) -> DispatchOutcome {
        match self.weather.current().await {
            Ok(report) => DispatchOutcome {
                spoken: format!(
                    "It's {} and {:.0} degrees.",
                    report.condition, report.temperature
                ),
                success: true,
            },
            Err(e) => {
                tracing::error!(error = %e, "weather lookup failed");
                DispatchOutcome {
                    spoken: "Sorry, I couldn't get the weather right now.".to_string(),
                    success: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> IntentRules {
        IntentRules::new(vec![
            EntityBinding {
                phrase: "kitchen lights".to_string(),
                entity_id: "light.kitchen".to_string(),
            },
            EntityBinding {
                phrase: "living room light".to_string(),
                entity_id: "light.living_room".to_string(),
            },
            EntityBinding {
                phrase: "light".to_string(),
                entity_id: "light.living_room".to_string(),
            },
        ])
    }

    #[test]
    fn test_turn_on_with_known_device() {
        let intent = rules().classify("turn on the kitchen lights").unwrap();
        assert_eq!(
            intent,
            Intent::HomeAutomation {
                action: HomeAction::TurnOn,
                device: Some(EntityBinding {
                    phrase: "kitchen lights".to_string(),
                    entity_id: "light.kitchen".to_string(),
                }),
            }
        );
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        let intent = rules().classify("Turn OFF the Kitchen Lights").unwrap();
        assert!(matches!(
            intent,
            Intent::HomeAutomation {
                action: HomeAction::TurnOff,
                ..
            }
        ));
    }

    #[test]
    fn test_weather_trigger() {
        assert_eq!(
            rules().classify("what's the weather like today"),
            Some(Intent::Weather)
        );
    }

    #[test]
    fn test_earlier_rule_wins_over_later() {
        // "turn on" is checked before "weather", so this is a device command
        let intent = rules().classify("turn on the weather station").unwrap();
        assert!(matches!(intent, Intent::HomeAutomation { .. }));
    }

    #[test]
    fn test_earlier_entity_wins_over_later() {
        let intent = rules().classify("toggle the kitchen lights").unwrap();
        let Intent::HomeAutomation { device, .. } = intent else {
            panic!("expected a device command");
        };
        assert_eq!(device.unwrap().entity_id, "light.kitchen");
    }

    #[test]
    fn test_generic_entity_catches_the_rest() {
        let intent = rules().classify("turn off the light").unwrap();
        let Intent::HomeAutomation { device, .. } = intent else {
            panic!("expected a device command");
        };
        assert_eq!(device.unwrap().entity_id, "light.living_room");
    }

    #[test]
    fn test_unknown_device_still_classifies() {
        let intent = rules().classify("turn on the sauna").unwrap();
        assert_eq!(
            intent,
            Intent::HomeAutomation {
                action: HomeAction::TurnOn,
                device: None,
            }
        );
    }

    #[test]
    fn test_conversation_is_not_classified() {
        assert_eq!(rules().classify("tell me a story about dragons"), None);
    }

    #[test]
    fn test_intent_labels() {
        assert_eq!(Intent::Weather.label(), "weather");
        assert_eq!(
            Intent::HomeAutomation {
                action: HomeAction::Toggle,
                device: None,
            }
            .label(),
            "home_automation"
        );
    }
}
