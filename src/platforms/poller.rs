// src/platforms/poller.rs - Periodic stream status and follower polling

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::bot::queue::EventSender;
use crate::bot::shutdown::ShutdownSignal;
use crate::types::EventKind;

/// Snapshot of the channel as reported by the platform
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStatus {
    pub live: bool,
    pub viewers: u32,
    pub title: String,
    pub game: String,
}

/// Where stream status and followers come from
#[async_trait]
pub trait StreamStatusSource: Send + Sync {
    async fn fetch_status(&self, channel: &str) -> Result<StreamStatus>;

    /// Most recent followers, newest first
    async fn fetch_followers(&self, channel: &str) -> Result<Vec<String>>;
}

/// Turns successive status snapshots into events
pub struct StatusPoller {
    source: Arc<dyn StreamStatusSource>,
    channel: String,
    events: EventSender,
    interval: Duration,
    last_status: Option<StreamStatus>,
    seen_followers: Option<HashSet<String>>,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn StreamStatusSource>, channel: &str, events: EventSender, interval: Duration) -> Self {
        Self {
            source,
            channel: channel.to_lowercase(),
            events,
            interval,
            last_status: None,
            seen_followers: None,
        }
    }

    /// Fetch once and enqueue whatever changed. Errors are logged; state is kept for the next poll.
    pub async fn poll_once(&mut self) {
        match self.source.fetch_status(&self.channel).await {
            Ok(status) => self.apply_status(status),
            Err(e) => warn!(target: "poller", "Failed to fetch stream status for {}: {:#}", self.channel, e),
        }

        match self.source.fetch_followers(&self.channel).await {
            Ok(followers) => self.apply_followers(followers),
            Err(e) => warn!(target: "poller", "Failed to fetch followers for {}: {:#}", self.channel, e),
        }
    }

    fn apply_status(&mut self, status: StreamStatus) {
        let previous = self.last_status.take().unwrap_or_default();

        if status.live && !previous.live {
            info!(target: "poller", "{} went live: {}", self.channel, status.title);
            self.events.send(EventKind::StreamOnline {
                title: status.title.clone(),
                game: status.game.clone(),
            });
        } else if !status.live && previous.live {
            info!(target: "poller", "{} went offline", self.channel);
            self.events.send(EventKind::StreamOffline);
        }

        if status.viewers != previous.viewers {
            self.events.send(EventKind::ViewerCountChanged { count: status.viewers });
        }

        self.last_status = Some(status);
    }

    fn apply_followers(&mut self, followers: Vec<String>) {
        let seen = match self.seen_followers.as_mut() {
            Some(seen) => seen,
            None => {
                debug!(target: "poller", "Primed follower list with {} names", followers.len());
                self.seen_followers = Some(followers.into_iter().map(|f| f.to_lowercase()).collect());
                return;
            }
        };

        // oldest first so events arrive in follow order
        for follower in followers.into_iter().rev() {
            let follower = follower.to_lowercase();
            if seen.insert(follower.clone()) {
                self.events.send(EventKind::Followed { user: follower });
            }
        }
    }

    /// Poll until shutdown
    pub fn spawn(mut self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(target: "poller", "Polling {} every {}s", self.channel, self.interval.as_secs());
            loop {
                self.poll_once().await;
                if shutdown.sleep(self.interval).await || self.events.is_closed() {
                    break;
                }
            }
            debug!(target: "poller", "Status poller stopped");
        })
    }
}
