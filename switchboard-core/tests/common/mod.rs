//! Shared fixtures: scripted transport, recording sink, registries

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, LazyLock};
use switchboard_core::config::{ModelConfig, ProviderConfig, ProviderKind, TimeoutConfig};
use switchboard_core::events::{NotificationSink, ProxyEvent};
use switchboard_core::http::{
    TransportError, UpstreamCall, UpstreamResponse, UpstreamTransport,
};
use switchboard_core::providers::{ProviderRegistry, RetryPolicy, StaticCredentialStore};
use switchboard_core::Supervisor;
use tracing_subscriber::EnvFilter;

static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Install a log subscriber once when `TEST_LOG` is set
pub fn init_tracing() {
    LazyLock::force(&TRACING);
}

/// One scripted transport outcome
pub enum Scripted {
    Fail(TransportError),
    Respond {
        status: u16,
        chunks: Vec<Result<Bytes, TransportError>>,
    },
    /// 200 whose body never yields
    Hang,
    /// Headers with `status`, then a body that never yields
    Stall(u16),
}

impl Scripted {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Scripted::Respond {
            status,
            chunks: vec![Ok(Bytes::from(body.to_string()))],
        }
    }

    pub fn sse(events: &[&str]) -> Self {
        Scripted::Respond {
            status: 200,
            chunks: events
                .iter()
                .map(|e| Ok(Bytes::from(format!("data: {e}\n\n"))))
                .collect(),
        }
    }
}

/// Plays back a fixed script and records every call with its send time
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<(tokio::time::Instant, UpstreamCall)>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.calls.lock().iter().map(|(at, _)| *at).collect()
    }

    pub fn last_call(&self) -> Option<UpstreamCall> {
        self.calls.lock().last().map(|(_, call)| call.clone())
    }
}

#[async_trait]
impl UpstreamTransport for ScriptedTransport {
    async fn send(&self, call: &UpstreamCall) -> Result<UpstreamResponse, TransportError> {
        self.calls
            .lock()
            .push((tokio::time::Instant::now(), call.clone()));

        let next = self.script.lock().pop_front();
        match next {
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Respond { status, chunks }) => Ok(UpstreamResponse::new(
                status,
                futures::stream::iter(chunks).boxed(),
            )),
            Some(Scripted::Hang) => Ok(UpstreamResponse::new(
                200,
                futures::stream::pending::<Result<Bytes, TransportError>>().boxed(),
            )),
            Some(Scripted::Stall(status)) => Ok(UpstreamResponse::new(
                status,
                futures::stream::pending::<Result<Bytes, TransportError>>().boxed(),
            )),
            None => Err(TransportError::Connect {
                message: "script exhausted".into(),
            }),
        }
    }
}

/// Keeps every event
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProxyEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProxyEvent> {
        self.events.lock().clone()
    }

    pub fn terminal(&self) -> Vec<ProxyEvent> {
        self.events()
            .into_iter()
            .filter(ProxyEvent::is_terminal)
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: &ProxyEvent) {
        self.events.lock().push(event.clone());
    }
}

pub fn fast_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        connect_ms: 1_000,
        first_byte_ms: 2_000,
        read_ms: 2_000,
        request_ms: 10_000,
    }
}

pub fn registry() -> Arc<ProviderRegistry> {
    Arc::new(ProviderRegistry::new(
        vec![
            ProviderConfig::new(
                "openai",
                ProviderKind::OpenaiCompatible,
                "https://api.openai.com/v1",
                "OPENAI_API_KEY",
            )
            .with_timeouts(fast_timeouts()),
            ProviderConfig::new(
                "moonshot",
                ProviderKind::OpenaiCompatible,
                "https://api.moonshot.ai/v1",
                "MOONSHOT_API_KEY",
            )
            .with_max_context_tokens(262_144)
            .with_timeouts(fast_timeouts()),
            ProviderConfig::new(
                "gemini",
                ProviderKind::Gemini,
                "https://generativelanguage.googleapis.com/v1beta",
                "GEMINI_API_KEY",
            )
            .with_max_context_tokens(1_048_576)
            .with_timeouts(fast_timeouts()),
            ProviderConfig::new(
                "managed",
                ProviderKind::Managed,
                "https://gateway.example.com/v1",
                "MANAGED_API_KEY",
            )
            .with_timeouts(fast_timeouts()),
            ProviderConfig::new(
                "legacy",
                ProviderKind::OpenaiCompatible,
                "https://legacy.example.com/v1",
                "LEGACY_API_KEY",
            )
            .disabled(),
        ],
        vec![
            ModelConfig::new("gpt-4o", "openai"),
            ModelConfig::new("kimi-for-coding", "moonshot").with_upstream_model("kimi-k2-0905-preview"),
            ModelConfig::new("gemini-flash", "gemini").with_upstream_model("gemini-2.5-flash"),
            ModelConfig::new("managed-chat", "managed"),
            ModelConfig::new("legacy-chat", "legacy"),
        ],
    ))
}

pub fn credentials() -> Arc<StaticCredentialStore> {
    Arc::new(
        StaticCredentialStore::new()
            .with_secret("OPENAI_API_KEY", "sk-openai-test-key")
            .with_secret("MOONSHOT_API_KEY", "sk-moonshot-test-key")
            .with_secret("GEMINI_API_KEY", "AIza-test-key")
            .with_secret("MANAGED_API_KEY", "managed-test-key"),
    )
}

/// Supervisor over the scripted transport, 100ms initial backoff, no jitter
pub fn supervisor(
    transport: Arc<ScriptedTransport>,
    sink: Arc<RecordingSink>,
) -> Supervisor {
    init_tracing();
    Supervisor::new(registry(), transport)
        .with_credentials(credentials())
        .with_notifier(sink)
        .with_retry_policy(RetryPolicy::new(3).with_delays(100, 1_000))
}

pub fn openai_completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o-2024-08-06",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
    })
}
