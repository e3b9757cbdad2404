//! Background ↔ PAC bridge.
//!
//! The PAC runtime runs as its own task and owns its state outright. The
//! background side talks to it only through a bounded channel: pushes are
//! fire-and-forget, lookups carry a reply channel.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use px_pac::{PacMessage, PacRuntime};

/// Pending commands before senders start waiting.
pub const DEFAULT_CAPACITY: usize = 64;

enum PacCommand {
    Push(PacMessage),
    FindProxy {
        url: String,
        host: String,
        reply: oneshot::Sender<String>,
    },
}

/// Handle to a running PAC actor.
#[derive(Clone)]
pub struct PacBridge {
    tx: mpsc::Sender<PacCommand>,
}

impl PacBridge {
    /// Spawn the PAC actor. It stops once every handle is dropped.
    pub fn spawn(capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<PacCommand>(capacity);

        let handle = tokio::spawn(async move {
            let runtime = PacRuntime::new();
            while let Some(command) = rx.recv().await {
                match command {
                    PacCommand::Push(message) => {
                        // delivery is best effort; the next init resyncs
                        if let Err(e) = runtime.apply(message) {
                            log::warn!("PAC runtime rejected message: {e}");
                        }
                    }
                    PacCommand::FindProxy { url, host, reply } => {
                        let _ = reply.send(runtime.find_proxy_for_url(&url, &host));
                    }
                }
            }
            log::debug!("PAC actor stopped");
        });

        (Self { tx }, handle)
    }

    pub async fn push(&self, message: PacMessage) -> Result<(), String> {
        self.tx
            .send(PacCommand::Push(message))
            .await
            .map_err(|_| "PAC actor has stopped".to_string())
    }

    pub async fn find_proxy(&self, url: &str, host: &str) -> Result<String, String> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PacCommand::FindProxy {
                url: url.to_string(),
                host: host.to_string(),
                reply,
            })
            .await
            .map_err(|_| "PAC actor has stopped".to_string())?;
        rx.await.map_err(|_| "PAC actor dropped the request".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_core::rule::{CompiledRuleRecord, CompiledRulesRecord};
    use px_core::types::{CompiledRuleType, ProfileType, ProxyServer, RuleSource};
    use px_pac::PacSnapshot;

    fn snapshot() -> PacSnapshot {
        PacSnapshot {
            profile_id: "smart".into(),
            proxy_mode: ProfileType::SmartRules,
            compiled_rules: CompiledRulesRecord {
                rules: vec![CompiledRuleRecord {
                    compiled_rule_type: CompiledRuleType::SearchDomainSubdomain,
                    regex: None,
                    search: Some("blocked.test".into()),
                    compiled_rule_source: RuleSource::Rules,
                    host_name: "blocked.test".into(),
                    proxy: None,
                    white_list: false,
                    rule_id: Some("r1".into()),
                }],
                ..Default::default()
            },
            active_proxy_server: Some(ProxyServer {
                id: "s".into(),
                name: "s".into(),
                host: "127.0.0.1".into(),
                port: 8080,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn pushes_apply_in_order() {
        let (bridge, handle) = PacBridge::spawn(DEFAULT_CAPACITY);

        assert_eq!(bridge.find_proxy("https://a.blocked.test/", "a.blocked.test").await.unwrap(), "DIRECT");

        bridge.push(PacMessage::Init(snapshot())).await.unwrap();
        assert_eq!(
            bridge.find_proxy("https://a.blocked.test/", "a.blocked.test").await.unwrap(),
            "PROXY 127.0.0.1:8080"
        );

        bridge
            .push(PacMessage::ProxyModeChanged(ProfileType::Direct))
            .await
            .unwrap();
        assert_eq!(bridge.find_proxy("https://a.blocked.test/", "a.blocked.test").await.unwrap(), "DIRECT");

        drop(bridge);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn rejected_push_keeps_actor_alive() {
        let (bridge, _handle) = PacBridge::spawn(1);
        // slice update before init is refused, not fatal
        bridge
            .push(PacMessage::ProxyModeChanged(ProfileType::AlwaysEnabledBypassRules))
            .await
            .unwrap();
        assert_eq!(bridge.find_proxy("https://x.test/", "").await.unwrap(), "DIRECT");
    }
}
