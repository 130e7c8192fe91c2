//! HTML form extraction for the OpenID redirect dance.
//!
//! Every hop of the login sequence is an HTML page whose first form must be
//! re-submitted to keep the flow moving. Only the action URL and the named
//! input values matter; the rest of the page is noise.

use std::collections::HashMap;

use scraper::{Html, Selector};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("document contains no form")]
    MissingForm,
    #[error("form has no action attribute")]
    MissingAction,
}

/// A form lifted out of a response body: where to submit it and what to send.
#[derive(Debug, Clone)]
pub struct ExtractedForm {
    /// Submit target, possibly relative to the page that served the form.
    pub action: String,
    /// Input values by name. `None` when the input had no value attribute.
    pub fields: HashMap<String, Option<String>>,
}

impl ExtractedForm {
    /// Field pairs ready for a form-encoded POST. A field without a value
    /// is sent as empty, not omitted.
    pub fn to_params(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.clone(), value.clone().unwrap_or_default()))
            .collect()
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.fields
            .insert(name.to_string(), Some(value.to_string()));
    }

    pub fn remove(&mut self, name: &str) {
        self.fields.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }
}

/// Redirect form served by the relying service. Submit buttons never carry
/// OpenID payload here, so they are all dropped.
pub fn parse_service_form(html: &str) -> Result<ExtractedForm, FormError> {
    extract(html, false)
}

/// Form served by the identity provider. Submit inputs named `decided_*`
/// encode the user's consent decision and must survive extraction.
pub fn parse_provider_form(html: &str) -> Result<ExtractedForm, FormError> {
    extract(html, true)
}

fn extract(html: &str, keep_decided_submits: bool) -> Result<ExtractedForm, FormError> {
    let document = Html::parse_document(html);
    let form_selector = Selector::parse("form").map_err(|_| FormError::MissingForm)?;
    let input_selector = Selector::parse("input").map_err(|_| FormError::MissingForm)?;

    let form = document
        .select(&form_selector)
        .next()
        .ok_or(FormError::MissingForm)?;
    let action = form
        .value()
        .attr("action")
        .ok_or(FormError::MissingAction)?
        .to_string();

    let mut fields = HashMap::new();
    for input in form.select(&input_selector) {
        let input = input.value();
        let name = match input.attr("name") {
            Some(name) => name,
            None => continue,
        };
        if input.attr("type") == Some("submit")
            && !(keep_decided_submits && name.starts_with("decided_"))
        {
            continue;
        }
        fields.insert(name.to_string(), input.attr("value").map(str::to_string));
    }

    Ok(ExtractedForm { action, fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONSENT_PAGE: &str = r#"<html><body>
        <form action="/provider/consent" method="post">
            <input type="hidden" name="openid.mode" value="id_res"/>
            <input type="submit" name="decided_allow" value="Allow"/>
            <input type="submit" name="decided_deny" value="Deny"/>
            <input type="submit" value="Continue"/>
        </form>
    </body></html>"#;

    #[test]
    fn provider_form_keeps_decided_submits() {
        let form = parse_provider_form(CONSENT_PAGE).unwrap();
        assert_eq!(form.action, "/provider/consent");
        assert_eq!(
            form.fields.get("openid.mode"),
            Some(&Some("id_res".to_string()))
        );
        assert_eq!(
            form.fields.get("decided_allow"),
            Some(&Some("Allow".to_string()))
        );
        assert_eq!(
            form.fields.get("decided_deny"),
            Some(&Some("Deny".to_string()))
        );
        // the anonymous submit button is browser chrome
        assert_eq!(form.fields.len(), 3);
    }

    #[test]
    fn service_form_drops_every_submit() {
        let form = parse_service_form(CONSENT_PAGE).unwrap();
        assert!(form.contains("openid.mode"));
        assert!(!form.contains("decided_allow"));
        assert!(!form.contains("decided_deny"));
    }

    #[test]
    fn missing_value_is_kept_and_sent_empty() {
        let page = r#"<form action="/login"><input type="text" name="username"/></form>"#;
        let form = parse_provider_form(page).unwrap();
        assert_eq!(form.fields.get("username"), Some(&None));
        assert_eq!(
            form.to_params(),
            vec![("username".to_string(), String::new())]
        );
    }

    #[test]
    fn unnamed_inputs_are_skipped() {
        let page = r#"<form action="/a"><input type="hidden" value="x"/></form>"#;
        let form = parse_provider_form(page).unwrap();
        assert!(form.fields.is_empty());
    }

    #[test]
    fn only_the_first_form_is_read() {
        let page = r#"
            <form action="/first"><input type="hidden" name="a" value="1"/></form>
            <form action="/second"><input type="hidden" name="b" value="2"/></form>"#;
        let form = parse_service_form(page).unwrap();
        assert_eq!(form.action, "/first");
        assert!(form.contains("a"));
        assert!(!form.contains("b"));
    }

    #[test]
    fn page_without_form_is_an_error() {
        let err = parse_provider_form("<html><body>nothing here</body></html>").unwrap_err();
        assert_eq!(err, FormError::MissingForm);
    }

    #[test]
    fn form_without_action_is_an_error() {
        let err = parse_service_form("<form><input name='a'/></form>").unwrap_err();
        assert_eq!(err, FormError::MissingAction);
    }

    #[test]
    fn set_and_remove_edit_fields() {
        let mut form = parse_provider_form(CONSENT_PAGE).unwrap();
        form.set("username", "alice");
        form.remove("decided_deny");
        assert_eq!(
            form.fields.get("username"),
            Some(&Some("alice".to_string()))
        );
        assert!(!form.contains("decided_deny"));
        // removing an absent field is a no-op
        form.remove("decided_deny");
    }
}
