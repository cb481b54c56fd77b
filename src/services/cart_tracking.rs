//! Cart abandonment tracking.
//!
//! Every cart change the storefront reports is kept as a [`CartSession`]. A
//! periodic sweep flags sessions idle past the abandonment threshold, sends a
//! bounded number of WhatsApp reminders and evicts sessions idle past the
//! eviction horizon. Sessions live in a [`CartSessionStore`]: process memory by
//! default, or Redis so that they survive restarts and are shared between
//! instances.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::CartTrackingConfig,
    errors::ServiceError,
    notifications::{
        format_phone_number,
        templates::{self, MessageLine},
        TemplateMessage, WhatsAppSender,
    },
    services::cart::CartLine,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSession {
    pub session_id: String,
    pub user_id: Option<String>,
    pub phone_number: Option<String>,
    pub customer_name: Option<String>,
    pub cart_items: Vec<CartLine>,
    pub last_updated: DateTime<Utc>,
    pub reminders_sent: u32,
    pub is_abandoned: bool,
}

impl CartSession {
    pub fn total(&self) -> Decimal {
        self.cart_items
            .iter()
            .map(|line| line.price * Decimal::from(line.quantity))
            .sum()
    }

    pub fn item_count(&self) -> i64 {
        self.cart_items.iter().map(|l| i64::from(l.quantity)).sum()
    }

    fn contact(&self) -> Option<(&str, &str)> {
        let phone = self.phone_number.as_deref().filter(|p| !p.trim().is_empty())?;
        let name = self.customer_name.as_deref().filter(|n| !n.trim().is_empty())?;
        Some((phone, name))
    }

    fn message_lines(&self) -> Vec<MessageLine<'_>> {
        self.cart_items
            .iter()
            .map(|l| MessageLine {
                name: &l.name,
                price: l.price,
                quantity: l.quantity,
            })
            .collect()
    }
}

/// Contact details the storefront attaches to a tracked cart
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartUserInfo {
    pub phone_number: Option<String>,
    pub name: Option<String>,
    pub user_id: Option<String>,
}

/// Storage for tracked cart sessions
#[async_trait]
pub trait CartSessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<CartSession>, ServiceError>;
    async fn put(&self, session: &CartSession) -> Result<(), ServiceError>;
    async fn remove(&self, session_id: &str) -> Result<(), ServiceError>;
    async fn list(&self) -> Result<Vec<CartSession>, ServiceError>;
}

/// Process-local store; sessions are lost on restart
#[derive(Default)]
pub struct InMemoryCartSessionStore {
    sessions: DashMap<String, CartSession>,
}

impl InMemoryCartSessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartSessionStore for InMemoryCartSessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<CartSession>, ServiceError> {
        Ok(self.sessions.get(session_id).map(|s| s.value().clone()))
    }

    async fn put(&self, session: &CartSession) -> Result<(), ServiceError> {
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<(), ServiceError> {
        self.sessions.remove(session_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<CartSession>, ServiceError> {
        Ok(self.sessions.iter().map(|e| e.value().clone()).collect())
    }
}

const SCAN_BATCH: usize = 200;

/// Redis-backed store. Each session is one JSON value whose TTL ends at the
/// eviction horizon, so Redis expires idle sessions on its own.
pub struct RedisCartSessionStore {
    client: Arc<redis::Client>,
    namespace: String,
    eviction: Duration,
}

impl RedisCartSessionStore {
    pub fn new(client: Arc<redis::Client>, namespace: impl Into<String>, eviction: Duration) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            eviction,
        }
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}:{}", self.namespace, session_id)
    }

    fn ttl_secs(&self, session: &CartSession) -> i64 {
        let expires_at = session.last_updated + self.eviction;
        (expires_at - Utc::now()).num_seconds().max(1)
    }
}

#[async_trait]
impl CartSessionStore for RedisCartSessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<CartSession>, ServiceError> {
        let mut conn = self.client.get_async_connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key(session_id))
            .query_async(&mut conn)
            .await?;
        raw.map(|json| serde_json::from_str(&json).map_err(ServiceError::from))
            .transpose()
    }

    async fn put(&self, session: &CartSession) -> Result<(), ServiceError> {
        let mut conn = self.client.get_async_connection().await?;
        let json = serde_json::to_string(session)?;
        redis::cmd("SET")
            .arg(self.key(&session.session_id))
            .arg(json)
            .arg("EX")
            .arg(self.ttl_secs(session))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<(), ServiceError> {
        let mut conn = self.client.get_async_connection().await?;
        redis::cmd("DEL")
            .arg(self.key(session_id))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<CartSession>, ServiceError> {
        let mut conn = self.client.get_async_connection().await?;
        let pattern = format!("{}:*", self.namespace);
        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;
        let mut sessions = Vec::with_capacity(values.len());
        for raw in values.into_iter().flatten() {
            match serde_json::from_str(&raw) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(error = %e, "skipping unreadable cart session"),
            }
        }
        Ok(sessions)
    }
}

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub abandoned: usize,
    pub reminded: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub abandonment_threshold: Duration,
    pub max_reminders: u32,
    pub eviction: Duration,
    pub sweep_interval: std::time::Duration,
    pub site_url: String,
}

impl TrackerSettings {
    pub fn from_config(config: &CartTrackingConfig, site_url: &str) -> Self {
        Self {
            abandonment_threshold: Duration::minutes(config.abandonment_threshold_mins),
            max_reminders: config.max_reminders,
            eviction: Duration::hours(config.eviction_hours),
            sweep_interval: std::time::Duration::from_secs(config.sweep_interval_secs),
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Abandoned and still-active sessions, as shown to admins
#[derive(Debug, Clone, Serialize)]
pub struct CartSessionOverview {
    pub abandoned: Vec<CartSession>,
    pub active: Vec<CartSession>,
}

pub struct CartTracker {
    store: Arc<dyn CartSessionStore>,
    whatsapp: Arc<dyn WhatsAppSender>,
    settings: TrackerSettings,
}

impl CartTracker {
    pub fn new(
        store: Arc<dyn CartSessionStore>,
        whatsapp: Arc<dyn WhatsAppSender>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            store,
            whatsapp,
            settings,
        }
    }

    /// Records the latest cart for a session, resetting its abandonment state.
    /// Returns the stored session.
    #[instrument(skip(self, items, user), fields(items = items.len()))]
    pub async fn track_update(
        &self,
        session_id: &str,
        items: Vec<CartLine>,
        user: Option<CartUserInfo>,
    ) -> Result<CartSession, ServiceError> {
        let user = user.unwrap_or_default();
        let session = CartSession {
            session_id: session_id.to_string(),
            user_id: user.user_id,
            phone_number: user.phone_number,
            customer_name: user.name,
            cart_items: items,
            last_updated: Utc::now(),
            reminders_sent: 0,
            is_abandoned: false,
        };
        self.store.put(&session).await?;
        debug!(session_id, "cart session tracked");
        Ok(session)
    }

    /// Whether a tracked update should trigger the immediate cart message
    pub fn wants_cart_notification(session: &CartSession) -> bool {
        session.contact().is_some() && !session.cart_items.is_empty()
    }

    pub async fn send_cart_notification(&self, session: &CartSession) -> Result<(), ServiceError> {
        let Some((phone, name)) = session.contact() else {
            return Ok(());
        };
        let body = templates::cart_notification(
            name,
            session.item_count(),
            session.total(),
            &self.settings.site_url,
        );
        self.whatsapp
            .send_text(&format_phone_number(phone), &body)
            .await?;
        Ok(())
    }

    /// Sends one abandonment reminder if the session has contact details and
    /// reminders left. The counter only moves when the provider accepts the
    /// message. Returns whether a reminder went out.
    pub async fn send_abandonment_reminder(
        &self,
        session: &mut CartSession,
    ) -> Result<bool, ServiceError> {
        let Some((phone, name)) = session.contact() else {
            return Ok(false);
        };
        if session.reminders_sent >= self.settings.max_reminders {
            return Ok(false);
        }

        let lines = session.message_lines();
        let template = TemplateMessage::cart_abandonment_reminder(
            name,
            templates::abandoned_items_list(&lines),
            format!("₹{}", templates::format_rupees(session.total())),
        );
        let phone = phone.to_string();
        match self.whatsapp.send_template(&phone, template).await {
            Ok(_) => {
                session.reminders_sent += 1;
                self.store.put(session).await?;
                Ok(true)
            }
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "abandonment reminder failed");
                Ok(false)
            }
        }
    }

    pub async fn mark_completed(&self, session_id: &str) -> Result<(), ServiceError> {
        self.store.remove(session_id).await
    }

    /// One pass over every session as of `now`
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, ServiceError> {
        let mut report = SweepReport::default();

        for mut session in self.store.list().await? {
            let idle = now - session.last_updated;

            if idle > self.settings.eviction {
                self.store.remove(&session.session_id).await?;
                report.evicted += 1;
                continue;
            }

            if idle > self.settings.abandonment_threshold
                && !session.is_abandoned
                && !session.cart_items.is_empty()
            {
                session.is_abandoned = true;
                self.store.put(&session).await?;
                report.abandoned += 1;

                if self.send_abandonment_reminder(&mut session).await? {
                    report.reminded += 1;
                }
            }
        }

        if report != SweepReport::default() {
            info!(?report, "cart abandonment sweep");
        }
        Ok(report)
    }

    pub async fn overview(&self) -> Result<CartSessionOverview, ServiceError> {
        let (abandoned, active) = self
            .store
            .list()
            .await?
            .into_iter()
            .partition::<Vec<_>, _>(|s| s.is_abandoned);
        let mut active: Vec<CartSession> = active
            .into_iter()
            .filter(|s| !s.cart_items.is_empty())
            .collect();
        let mut abandoned = abandoned;
        abandoned.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        active.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(CartSessionOverview { abandoned, active })
    }

    /// Runs [`CartTracker::sweep`] on the configured interval until the task is aborted
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.settings.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep(Utc::now()).await {
                    warn!(error = %e, "cart sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{MockWhatsAppSender, NotificationError};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn settings() -> TrackerSettings {
        TrackerSettings::from_config(&CartTrackingConfig::default(), "https://shop.test/")
    }

    fn items() -> Vec<CartLine> {
        vec![
            CartLine {
                id: Uuid::new_v4(),
                name: "Kanjivaram Silk".into(),
                price: dec!(500),
                image: String::new(),
                quantity: 2,
            },
            CartLine {
                id: Uuid::new_v4(),
                name: "Chanderi Cotton".into(),
                price: dec!(300),
                image: String::new(),
                quantity: 1,
            },
        ]
    }

    fn contact() -> Option<CartUserInfo> {
        Some(CartUserInfo {
            phone_number: Some("+919876543210".into()),
            name: Some("Priya".into()),
            user_id: None,
        })
    }

    fn tracker(whatsapp: MockWhatsAppSender) -> (Arc<InMemoryCartSessionStore>, CartTracker) {
        let store = Arc::new(InMemoryCartSessionStore::new());
        let tracker = CartTracker::new(store.clone(), Arc::new(whatsapp), settings());
        (store, tracker)
    }

    #[tokio::test]
    async fn tracked_session_totals_its_items() {
        let (_, tracker) = tracker(MockWhatsAppSender::new());
        let session = tracker.track_update("s1", items(), contact()).await.unwrap();
        assert_eq!(session.total(), dec!(1300));
        assert_eq!(session.item_count(), 3);
        assert!(CartTracker::wants_cart_notification(&session));

        let anonymous = tracker.track_update("s2", items(), None).await.unwrap();
        assert!(!CartTracker::wants_cart_notification(&anonymous));
    }

    #[tokio::test]
    async fn cart_notification_text_goes_to_formatted_number() {
        let mut whatsapp = MockWhatsAppSender::new();
        whatsapp
            .expect_send_text()
            .withf(|to, body| {
                to.to_string() == "919876543210"
                    && body.contains("3 item(s) in your cart worth ₹1,300")
                    && body.contains("https://shop.test/cart")
            })
            .times(1)
            .returning(|_, _| Ok(None));
        let (_, tracker) = tracker(whatsapp);
        let session = tracker.track_update("s1", items(), contact()).await.unwrap();
        tracker.send_cart_notification(&session).await.unwrap();
    }

    #[tokio::test]
    async fn sweep_marks_idle_sessions_and_sends_one_reminder() {
        let mut whatsapp = MockWhatsAppSender::new();
        whatsapp
            .expect_send_template()
            .withf(|_, template| {
                template.name == "cart_abandonment_reminder" && template.parameters[2] == "₹1,300"
            })
            .times(1)
            .returning(|_, _| Ok(Some("wamid.1".into())));
        let (store, tracker) = tracker(whatsapp);
        tracker.track_update("s1", items(), contact()).await.unwrap();

        let later = Utc::now() + Duration::minutes(31);
        let report = tracker.sweep(later).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                abandoned: 1,
                reminded: 1,
                evicted: 0
            }
        );
        let stored = store.get("s1").await.unwrap().unwrap();
        assert!(stored.is_abandoned);
        assert_eq!(stored.reminders_sent, 1);

        // Already abandoned: no second reminder on the next sweep.
        let report = tracker.sweep(later + Duration::minutes(5)).await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn failed_send_does_not_count_as_reminder() {
        let mut whatsapp = MockWhatsAppSender::new();
        whatsapp.expect_send_template().times(1).returning(|_, _| {
            Err(NotificationError::Upstream {
                status: 400,
                body: "template not approved".into(),
            })
        });
        let (store, tracker) = tracker(whatsapp);
        tracker.track_update("s1", items(), contact()).await.unwrap();

        let report = tracker.sweep(Utc::now() + Duration::minutes(45)).await.unwrap();
        assert_eq!(report.abandoned, 1);
        assert_eq!(report.reminded, 0);
        assert_eq!(store.get("s1").await.unwrap().unwrap().reminders_sent, 0);
    }

    #[tokio::test]
    async fn reminders_stop_at_the_limit() {
        let (_, tracker) = tracker(MockWhatsAppSender::new());
        let mut session = tracker.track_update("s1", items(), contact()).await.unwrap();
        session.reminders_sent = 3;
        assert!(!tracker.send_abandonment_reminder(&mut session).await.unwrap());
    }

    #[tokio::test]
    async fn sessions_without_contact_or_items_are_not_reminded() {
        let (store, tracker) = tracker(MockWhatsAppSender::new());
        tracker.track_update("anon", items(), None).await.unwrap();
        tracker.track_update("empty", Vec::new(), contact()).await.unwrap();

        let report = tracker.sweep(Utc::now() + Duration::hours(1)).await.unwrap();
        assert_eq!(report.abandoned, 1);
        assert_eq!(report.reminded, 0);
        assert!(!store.get("empty").await.unwrap().unwrap().is_abandoned);
    }

    #[tokio::test]
    async fn day_old_sessions_are_evicted() {
        let (store, tracker) = tracker(MockWhatsAppSender::new());
        tracker.track_update("old", items(), None).await.unwrap();

        let report = tracker.sweep(Utc::now() + Duration::hours(25)).await.unwrap();
        assert_eq!(report.evicted, 1);
        assert!(store.get("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn completed_checkout_removes_session_and_overview_splits() {
        let (_, tracker) = tracker(MockWhatsAppSender::new());
        tracker.track_update("done", items(), None).await.unwrap();
        tracker.track_update("browsing", items(), None).await.unwrap();
        tracker.mark_completed("done").await.unwrap();

        let overview = tracker.overview().await.unwrap();
        assert!(overview.abandoned.is_empty());
        assert_eq!(overview.active.len(), 1);
        assert_eq!(overview.active[0].session_id, "browsing");
    }
}
