use serde::{Deserialize, Serialize};

/// A templated email. The relay renders `template` with `vars`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub template: String,
    /// Full From header, e.g. `Libero Vitae <no-reply@liberovitae.com>`.
    pub from: String,
    pub to: String,
    pub vars: serde_json::Map<String, serde_json::Value>,
}

impl EmailMessage {
    pub fn new(template: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            from: from.into(),
            to: to.into(),
            vars: serde_json::Map::new(),
        }
    }

    /// Builder-style template variable.
    pub fn var(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }
}

/// The JSON a service worker receives and turns into a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub image: String,
    pub url: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vars_accumulate() {
        let msg = EmailMessage::new("reminder", "Site <a@b.c>", "u@x.y")
            .var("sitename", "Site")
            .var("count", 3);
        assert_eq!(msg.vars.len(), 2);
        assert_eq!(msg.vars["count"], 3);
    }
}
