//! HTTP push relay client.
//!
//! The relay owns VAPID signing and payload encryption; the gateway hands it
//! the subscription, the clear payload and a TTL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use crate::db::subscriptions::PushSubscription;

use super::{PushError, PushPayload, PushService};

#[derive(Serialize)]
struct RelayRequest<'a> {
    subscription: &'a PushSubscription,
    payload: &'a PushPayload,
    ttl: u64,
}

pub struct HttpPushService {
    client: reqwest::Client,
    relay_url: String,
}

impl HttpPushService {
    pub fn new(relay_url: impl Into<String>, timeout: Duration) -> Result<Self, PushError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            relay_url: relay_url.into(),
        })
    }
}

/// Map a relay response status to a delivery result.
fn classify(status: StatusCode) -> Result<(), PushError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        Err(PushError::Gone(status.as_u16()))
    } else {
        Err(PushError::Rejected(status.as_u16()))
    }
}

#[async_trait]
impl PushService for HttpPushService {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
        ttl: Duration,
    ) -> Result<(), PushError> {
        let resp = self
            .client
            .post(&self.relay_url)
            .json(&RelayRequest {
                subscription,
                payload,
                ttl: ttl.as_secs(),
            })
            .send()
            .await?;

        classify(resp.status())
    }
}
