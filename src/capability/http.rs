//! HTTP publish-time reader.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use super::PublishTimeReader;
use crate::error::{Error, Result};
use crate::model::{Identifier, PublishTime};

/// GETs a JSON document per identifier and reads the publish time (epoch
/// seconds) at a JSON pointer.
///
/// A missing, non-numeric or negative value means the item is gone.
#[derive(Debug, Clone)]
pub struct HttpPublishTimeReader {
    client: reqwest::Client,
    url_template: String,
    pointer: String,
    token: Option<SecretString>,
}

impl HttpPublishTimeReader {
    /// `url_template` must contain `{id}`.
    pub fn new(
        url_template: impl Into<String>,
        pointer: impl Into<String>,
        token: Option<SecretString>,
    ) -> Result<Self> {
        let url_template = url_template.into();
        if !url_template.contains("{id}") {
            return Err(Error::Config(format!(
                "metadata url {url_template:?} has no {{id}} placeholder"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("harvest-rs/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url_template,
            pointer: pointer.into(),
            token,
        })
    }

    /// The request URL for `id`, percent-encoded into the template.
    pub fn url_for(&self, id: &Identifier) -> String {
        self.url_template
            .replace("{id}", &urlencoding::encode(id.as_str()))
    }
}

#[async_trait]
impl PublishTimeReader for HttpPublishTimeReader {
    async fn read_publish_time(&self, id: &Identifier) -> Result<PublishTime> {
        let mut request = self.client.get(self.url_for(id));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }
        let body: serde_json::Value = request.send().await?.error_for_status()?.json().await?;
        Ok(publish_time_at(&body, &self.pointer))
    }
}

/// Extract the publish time at `pointer`. Accepts numbers and numeric strings.
pub fn publish_time_at(body: &serde_json::Value, pointer: &str) -> PublishTime {
    let secs = match body.pointer(pointer) {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    secs.map_or(PublishTime::Gone, PublishTime::from_epoch_secs)
}
