// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Best-effort progress messages.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use url::Url;

/// Receives progress messages. Delivery problems stay inside the sink.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn try_send(&self, message: &str);
}

/// Drops every message
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn try_send(&self, message: &str) {
        tracing::trace!("Notification dropped: {}", message);
    }
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    message: &'a str,
}

/// Posts `{"message": ...}` to a webhook, with an optional bearer token.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Url,
    token: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Url, token: Option<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build notifier HTTP client")?;
        Ok(Self { client, url, token })
    }

    async fn send(&self, message: &str) -> anyhow::Result<()> {
        let mut request = self.client.post(self.url.clone()).json(&WebhookMessage { message });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn try_send(&self, message: &str) {
        if let Err(e) = self.send(message).await {
            tracing::warn!("Failed to send notification to {}: {:?}", self.url, e);
        }
    }
}
