//! Sequence validation: run this before persisting a definition.
//!
//! Rules enforced:
//! 1. The name must not be blank.
//! 2. There must be at least one step.
//! 3. Every step must be executable as written (see [`check_step`]).

use crate::{EngineError, StepDefinition};

/// Longest delay a single step may ask for.
pub const MAX_DELAY_HOURS: u32 = 24 * 366;

/// Validate a definition's name and steps.
///
/// # Errors
/// - [`EngineError::EmptyName`] for a blank name.
/// - [`EngineError::NoSteps`] for an empty step list.
/// - [`EngineError::MalformedStep`] for the first step that fails [`check_step`].
pub fn validate_sequence(name: &str, steps: &[StepDefinition]) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::EmptyName);
    }
    if steps.is_empty() {
        return Err(EngineError::NoSteps);
    }
    steps.iter().enumerate().try_for_each(|(index, step)| check_step(index, step))
}

/// Check a single step. The engine re-runs this on the snapshotted step at
/// advance time, so a bad row in storage fails the record instead of
/// sending garbage.
pub fn check_step(index: usize, step: &StepDefinition) -> Result<(), EngineError> {
    let malformed = |message: &str| EngineError::MalformedStep { index, message: message.to_string() };

    match step {
        StepDefinition::Delay { hours } if *hours > MAX_DELAY_HOURS => {
            Err(malformed(&format!("delay of {hours}h exceeds {MAX_DELAY_HOURS}h")))
        }
        StepDefinition::Delay { .. } => Ok(()),
        StepDefinition::SendMessage { content, template_name, template_params, .. } => {
            match template_name.as_deref().map(str::trim) {
                Some("") => Err(malformed("template_name is blank")),
                None if !template_params.is_empty() => {
                    Err(malformed("template_params given without template_name"))
                }
                None if content.trim().is_empty() => Err(malformed("message content is empty")),
                _ => Ok(()),
            }
        }
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use providers::Channel;

    #[test]
    fn accepts_a_typical_sequence() {
        let steps = vec![
            StepDefinition::message(Channel::Whatsapp, "Hi {{first_name}}"),
            StepDefinition::delay(24),
            StepDefinition::message(Channel::Email, "Still there?"),
        ];
        assert!(validate_sequence("welcome", &steps).is_ok());
    }

    #[test]
    fn rejects_blank_name_and_empty_steps() {
        let steps = vec![StepDefinition::delay(1)];
        assert!(matches!(validate_sequence("  ", &steps), Err(EngineError::EmptyName)));
        assert!(matches!(validate_sequence("x", &[]), Err(EngineError::NoSteps)));
    }

    #[test]
    fn rejects_empty_message_without_template() {
        let steps = vec![StepDefinition::delay(1), StepDefinition::message(Channel::Sms, " ")];
        let err = validate_sequence("x", &steps).unwrap_err();
        assert!(matches!(err, EngineError::MalformedStep { index: 1, .. }));
    }

    #[test]
    fn template_only_message_is_fine() {
        let step = StepDefinition::SendMessage {
            channel: Channel::Whatsapp,
            content: String::new(),
            template_name: Some("promo_v2".into()),
            template_params: BTreeMap::from([("1".to_string(), "{{name}}".to_string())]),
        };
        assert!(check_step(0, &step).is_ok());
    }

    #[test]
    fn params_need_a_template() {
        let step = StepDefinition::SendMessage {
            channel: Channel::Whatsapp,
            content: "hello".into(),
            template_name: None,
            template_params: BTreeMap::from([("1".to_string(), "x".to_string())]),
        };
        assert!(check_step(0, &step).is_err());
    }

    #[test]
    fn overlong_delay_is_rejected() {
        assert!(check_step(0, &StepDefinition::delay(MAX_DELAY_HOURS + 1)).is_err());
    }
}
