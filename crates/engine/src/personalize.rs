//! `{{placeholder}}` substitution against customer fields.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::Customer;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid"))
}

fn lookup<'a>(customer: &'a Customer, key: &str) -> Option<Cow<'a, str>> {
    match key {
        "name" => Some(Cow::Borrowed(customer.name.as_str())),
        "first_name" => customer.name.split_whitespace().next().map(Cow::Borrowed),
        "phone" => customer.phone.as_deref().map(Cow::Borrowed),
        "email" => customer.email.as_deref().map(Cow::Borrowed),
        "customer_id" => Some(Cow::Owned(customer.id.to_string())),
        other => match customer.attributes.get(other)? {
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            _ => None,
        },
    }
}

/// Replace every known placeholder in `text`. Unknown ones stay as written
/// so a typo is visible in the delivered message and the log.
pub fn personalize(text: &str, customer: &Customer) -> String {
    placeholder()
        .replace_all(text, |caps: &Captures<'_>| match lookup(customer, &caps[1]) {
            Some(value) => value.into_owned(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Personalise each template parameter value.
pub fn personalize_params(params: &BTreeMap<String, String>, customer: &Customer) -> BTreeMap<String, String> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), personalize(v, customer)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn customer() -> Customer {
        let mut c = Customer::new("Siti Rahma").with_phone("0812").with_email("siti@example.com");
        c.attributes.insert("plan".into(), json!("gold"));
        c.attributes.insert("points".into(), json!(120));
        c
    }

    #[test]
    fn substitutes_builtin_and_custom_fields() {
        let c = customer();
        let out = personalize("Hi {{first_name}} ({{ name }}), your {{plan}} plan has {{points}} pts", &c);
        assert_eq!(out, "Hi Siti (Siti Rahma), your gold plan has 120 pts");
    }

    #[test]
    fn unknown_placeholders_are_left_intact() {
        let out = personalize("Hello {{nickname}}!", &customer());
        assert_eq!(out, "Hello {{nickname}}!");
    }

    #[test]
    fn missing_optional_field_is_left_intact() {
        let c = Customer::new("Budi");
        assert_eq!(personalize("{{email}}", &c), "{{email}}");
    }

    #[test]
    fn params_are_personalised() {
        let params = BTreeMap::from([("1".to_string(), "{{first_name}}".to_string())]);
        let out = personalize_params(&params, &customer());
        assert_eq!(out["1"], "Siti");
    }
}
