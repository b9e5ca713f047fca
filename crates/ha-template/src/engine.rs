use std::sync::Arc;

use ha_state_machine::StateMachine;
use minijinja::{Environment, Value};
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::error::TemplateResult;
use crate::filters;
use crate::states::StatesObject;

pub struct TemplateEngine {
    env: Environment<'static>,
    states: Arc<StatesObject>,
}

impl TemplateEngine {
    pub fn new(state_machine: Arc<StateMachine>) -> Self {
        let states = Arc::new(StatesObject::new(state_machine));
        let mut env = Environment::new();

        env.add_filter("float", filters::to_float);
        env.add_filter("int", filters::to_int);
        env.add_filter("round", filters::round);
        env.add_filter("slugify", filters::slugify);
        env.add_filter("to_json", filters::to_json);
        env.add_filter("from_json", filters::from_json);
        env.add_filter("regex_replace", filters::regex_replace);

        env.add_global("states", Value::from_object((*states).clone()));

        let s = states.clone();
        env.add_function("is_state", move |entity_id: &str, state: &str| {
            s.is_state(entity_id, state)
        });
        let s = states.clone();
        env.add_function("state_attr", move |entity_id: &str, attribute: &str| {
            s.state_attr(entity_id, attribute)
        });
        let s = states.clone();
        env.add_function("has_value", move |entity_id: &str| s.has_value(entity_id));

        Self { env, states }
    }

    pub fn render(&self, template: &str) -> TemplateResult<String> {
        self.render_with_context(template, ())
    }

    pub fn render_with_context(
        &self,
        template: &str,
        context: impl serde::Serialize,
    ) -> TemplateResult<String> {
        trace!(template, "rendering");
        Ok(self.env.render_str(template, context)?)
    }

    /// Render every templated string inside `value` with `variables`.
    ///
    /// Non-string leaves and strings without template markers are returned
    /// unchanged. A rendered string that parses as a JSON literal (number,
    /// boolean, list, object, null) is replaced by that literal.
    pub fn render_value(&self, value: &JsonValue, variables: &JsonValue) -> TemplateResult<JsonValue> {
        Ok(match value {
            JsonValue::String(s) if Self::is_template(s) => {
                native(self.render_with_context(s, variables)?)
            }
            JsonValue::Array(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.render_value(item, variables))
                    .collect::<TemplateResult<_>>()?,
            ),
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.render_value(v, variables)?)))
                    .collect::<TemplateResult<_>>()?,
            ),
            other => other.clone(),
        })
    }

    /// True when `template` contains `{{`, `{%` or `{#`.
    pub fn is_template(template: &str) -> bool {
        template.contains("{{") || template.contains("{%") || template.contains("{#")
    }

    pub fn states(&self) -> &StatesObject {
        &self.states
    }
}

fn native(rendered: String) -> JsonValue {
    let trimmed = rendered.trim();
    let looks_literal = trimmed
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '[' | '{' | 't' | 'f' | 'n'));
    if looks_literal {
        if let Ok(parsed) = serde_json::from_str::<JsonValue>(trimmed) {
            return parsed;
        }
    }
    JsonValue::String(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::{Context, EntityId};
    use ha_event_bus::EventBus;
    use serde_json::json;
    use std::collections::HashMap;

    fn make_test_engine() -> TemplateEngine {
        let machine = Arc::new(StateMachine::new(Arc::new(EventBus::new())));
        machine.set(
            EntityId::new("number", "volume").unwrap(),
            "30",
            HashMap::from([
                ("min".to_string(), json!(0)),
                ("max".to_string(), json!(100)),
                ("friendly_name".to_string(), json!("TV Volume")),
            ]),
            Context::new(),
        );
        machine.set(
            EntityId::new("switch", "mute").unwrap(),
            "off",
            HashMap::new(),
            Context::new(),
        );
        machine.set(
            EntityId::new("sensor", "title").unwrap(),
            "unavailable",
            HashMap::new(),
            Context::new(),
        );
        TemplateEngine::new(machine)
    }

    #[test]
    fn test_state_functions() {
        let engine = make_test_engine();
        assert_eq!(engine.render("{{ states('number.volume') }}").unwrap(), "30");
        assert_eq!(engine.render("{{ states('number.nope') }}").unwrap(), "unknown");
        assert_eq!(engine.render("{{ states.switch.mute.state }}").unwrap(), "off");
        assert_eq!(engine.render("{{ states.number.volume.name }}").unwrap(), "TV Volume");
        assert_eq!(engine.render("{{ is_state('switch.mute', 'off') }}").unwrap(), "true");
        assert_eq!(engine.render("{{ state_attr('number.volume', 'max') }}").unwrap(), "100");
        assert_eq!(engine.render("{{ has_value('sensor.title') }}").unwrap(), "false");
        assert_eq!(engine.render("{{ has_value('number.volume') }}").unwrap(), "true");
    }

    #[test]
    fn test_filters() {
        let engine = make_test_engine();
        assert_eq!(engine.render("{{ '12.5' | float + 1 }}").unwrap(), "13.5");
        assert_eq!(engine.render("{{ 'abc' | float(0) }}").unwrap(), "0");
        assert_eq!(engine.render("{{ 7.9 | int }}").unwrap(), "7");
        assert_eq!(engine.render("{{ 2.346 | round(2) }}").unwrap(), "2.35");
        assert_eq!(engine.render("{{ 'Living Room' | slugify }}").unwrap(), "living_room");
        assert_eq!(
            engine.render("{{ 'a  b' | regex_replace('\\\\s+', '_') }}").unwrap(),
            "a_b"
        );
        assert!(engine.render("{{ 'abc' | float }}").is_err());
    }

    #[test]
    fn test_render_value_native_types() {
        let engine = make_test_engine();
        let vars = json!({"seek_position": 42.5, "media_id": "http://x/y.mp4", "flag": true});
        let data = json!({
            "value": "{{ seek_position }}",
            "url": "{{ media_id }}",
            "enabled": "{{ flag }}",
            "fixed": 3,
            "plain": "no template",
            "nested": ["{{ seek_position | int }}"]
        });

        let rendered = engine.render_value(&data, &vars).unwrap();
        assert_eq!(
            rendered,
            json!({
                "value": 42.5,
                "url": "http://x/y.mp4",
                "enabled": true,
                "fixed": 3,
                "plain": "no template",
                "nested": [42]
            })
        );
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let engine = make_test_engine();
        let err = engine.render("{{ unclosed").unwrap_err();
        assert!(matches!(err, crate::TemplateError::Syntax(_)));
    }

    #[test]
    fn test_is_template() {
        assert!(TemplateEngine::is_template("{{ media_id }}"));
        assert!(TemplateEngine::is_template("{% if x %}y{% endif %}"));
        assert!(TemplateEngine::is_template("{# note #}"));
        assert!(!TemplateEngine::is_template("button.press"));
    }
}
