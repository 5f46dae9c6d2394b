//! One IRC connection: feeds chat messages to the dispatcher and sends the
//! replies back.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use bender_sdk::client::{self, ClientHandle, ConnectConfig, ReconnectConfig};
use bender_sdk::event::Event;
use parking_lot::Mutex;

use crate::config::ServerSettings;
use crate::dispatch::Dispatcher;
use crate::output;
use crate::plugins::EventContext;

/// Per-connection state shared by the event handler.
pub struct Session {
    server: String,
    own_nick: Mutex<String>,
    ignore: HashSet<String>,
    dispatcher: Arc<Dispatcher>,
}

impl Session {
    pub fn new(server: &ServerSettings, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            server: server.host.clone(),
            own_nick: Mutex::new(server.nick.clone()),
            ignore: server.ignore.iter().cloned().collect(),
            dispatcher,
        }
    }

    /// React to one client event. Chat messages are dispatched on a
    /// blocking thread, since plugin handlers may block.
    pub async fn handle_event(self: &Arc<Self>, handle: &ClientHandle, event: Event) -> Result<()> {
        match event {
            Event::Registered { nick } => {
                tracing::info!(server = %self.server, %nick, "Registered");
                *self.own_nick.lock() = nick;
            }
            Event::NickChanged { old_nick, new_nick } => {
                let mut own = self.own_nick.lock();
                if *own == old_nick {
                    tracing::info!(server = %self.server, nick = %new_nick, "Nick changed");
                    *own = new_nick;
                }
            }
            Event::Joined { channel, nick } if nick == *self.own_nick.lock() => {
                tracing::info!(server = %self.server, %channel, "Joined");
            }
            Event::Kicked { channel, nick, by, reason } if nick == *self.own_nick.lock() => {
                tracing::warn!(server = %self.server, %channel, %by, %reason, "Kicked from channel");
            }
            Event::Message { from, notice: true, .. } => {
                tracing::debug!(server = %self.server, nick = %from, "Not answering notice");
            }
            Event::Message {
                from,
                target,
                text,
                action,
                raw,
                ..
            } => {
                self.dispatch(
                    handle,
                    EventContext {
                        nick: from,
                        channel: target,
                        message: text,
                        action,
                        raw,
                    },
                );
            }
            Event::ServerNotice { text } => {
                tracing::debug!(server = %self.server, %text, "Server notice");
            }
            Event::Disconnected { reason } => {
                tracing::warn!(server = %self.server, %reason, "Disconnected");
            }
            _ => {}
        }
        Ok(())
    }

    /// Spawn the handling of one chat message. `ctx.channel` holds the
    /// message target on the way in and the reply target once dispatched.
    /// `None` if the message is ignored.
    fn dispatch(self: &Arc<Self>, handle: &ClientHandle, mut ctx: EventContext) -> Option<tokio::task::JoinHandle<()>> {
        if ctx.nick == *self.own_nick.lock() {
            return None;
        }
        if self.ignore.contains(&ctx.nick) {
            tracing::debug!(server = %self.server, nick = %ctx.nick, "Ignoring message");
            return None;
        }
        if !is_channel(&ctx.channel) {
            ctx.channel = ctx.nick.clone();
        }
        let reply_to = ctx.channel.clone();

        let session = self.clone();
        let handle = handle.clone();
        Some(tokio::spawn(async move {
            let dispatcher = session.dispatcher.clone();
            let replies = match tokio::task::spawn_blocking(move || dispatcher.handle_event(&ctx)).await {
                Ok(replies) => replies,
                Err(e) => {
                    tracing::error!(server = %session.server, error = %e, "Message handler panicked");
                    return;
                }
            };
            if let Err(e) = output::send_replies(&handle, &reply_to, &replies).await {
                tracing::warn!(server = %session.server, target = %reply_to, error = %e, "Failed to send reply");
            }
        }))
    }
}

fn is_channel(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}

/// Connect to one server and keep the connection up for the life of the
/// process.
pub async fn run_server(server: ServerSettings, dispatcher: Arc<Dispatcher>) -> Result<()> {
    tracing::info!(
        server = %server.addr,
        nick = %server.nick,
        channels = ?server.channels,
        tls = server.tls,
        "Starting connection"
    );
    let connect = ConnectConfig {
        server_addr: server.addr.clone(),
        nick: server.nick.clone(),
        user: server.nick.clone(),
        realname: server.realname.clone(),
        password: server.password.clone(),
        tls: server.tls,
        tls_insecure: server.tls_insecure,
    };
    let reconnect = ReconnectConfig {
        channels: server.channels.clone(),
        ..Default::default()
    };
    let session = Arc::new(Session::new(&server, dispatcher));

    client::run_with_reconnect(connect, reconnect, move |handle, event| {
        let session = session.clone();
        Box::pin(async move { session.handle_event(&handle, event).await })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::factoids::FactoidStore;
    use crate::plugins::PluginRegistry;
    use bender_sdk::client::Command;

    fn message(from: &str, target: &str, text: &str) -> EventContext {
        EventContext {
            nick: from.to_string(),
            channel: target.to_string(),
            message: text.to_string(),
            ..Default::default()
        }
    }

    fn session(dir: &std::path::Path) -> Arc<Session> {
        let store = Arc::new(FactoidStore::open(dir.join("factoids.json")).unwrap());
        let dispatcher = Arc::new(Dispatcher::new(
            Config::default(),
            store,
            Arc::new(PluginRegistry::new()),
        ));
        let server = ServerSettings {
            host: "irc.example.net".to_string(),
            addr: "irc.example.net:6667".to_string(),
            nick: "bender".to_string(),
            realname: "Bender".to_string(),
            tls: false,
            tls_insecure: false,
            password: None,
            channels: vec!["#bender".to_string()],
            ignore: vec!["otherbot".to_string()],
        };
        Arc::new(Session::new(&server, dispatcher))
    }

    #[test]
    fn channel_targets() {
        assert!(is_channel("#bender"));
        assert!(is_channel("&local"));
        assert!(!is_channel("fry"));
    }

    #[tokio::test]
    async fn channel_message_gets_reply_in_channel() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let (handle, mut rx) = ClientHandle::detached(8);

        let task = session
            .dispatch(&handle, message("fry", "#bender", "!coffee"))
            .unwrap();
        task.await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            Command::Action {
                target: "#bender".to_string(),
                text: "pours fry a cup of hot coffee, straight from the pot".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn private_message_is_answered_privately() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let (handle, mut rx) = ClientHandle::detached(8);

        let task = session
            .dispatch(&handle, message("fry", "bender", "!? nothing"))
            .unwrap();
        task.await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            Command::Privmsg {
                target: "fry".to_string(),
                text: "Nobody cares about nothing!".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn ignored_and_own_messages_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let (handle, _rx) = ClientHandle::detached(8);

        assert!(session
            .dispatch(&handle, message("otherbot", "#bender", "!coffee"))
            .is_none());
        assert!(session
            .dispatch(&handle, message("bender", "#bender", "!coffee"))
            .is_none());
    }

    #[tokio::test]
    async fn notices_are_never_answered() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let (handle, mut rx) = ClientHandle::detached(8);

        session
            .handle_event(
                &handle,
                Event::Message {
                    from: "fry".into(),
                    target: "#bender".into(),
                    text: "!coffee".into(),
                    action: false,
                    notice: true,
                    raw: None,
                    tags: Default::default(),
                },
            )
            .await
            .unwrap();
        drop(handle);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn tracks_own_nick_changes() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let (handle, _rx) = ClientHandle::detached(8);

        session
            .handle_event(&handle, Event::Registered { nick: "bender1".into() })
            .await
            .unwrap();
        session
            .handle_event(
                &handle,
                Event::NickChanged {
                    old_nick: "bender1".into(),
                    new_nick: "bender2".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(*session.own_nick.lock(), "bender2");
    }
}
