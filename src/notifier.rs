//! Push notifications via ntfy.
//!
//! Two modes: realtime per-profile alerts at the end of an orchestration
//! (belled destinations get their own push, the rest are rolled into one
//! summary), and the once-a-day digest. Delivery is best-effort: a failed
//! post is logged and never fails the pipeline, and surfaced deals are
//! marked notified even when nothing could be sent, so they don't re-alert
//! on every cycle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{info, warn};

use crate::airports::MetroIndex;
use crate::deals::DealView;
use crate::deals_repo::DealsRepository;
use crate::profiles::SearchProfile;
use crate::users::User;

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// How many unbelled destinations the realtime summary lists.
const SUMMARY_TOP_N: usize = 3;

/// How many destinations the daily digest lists.
const DIGEST_MAX_LINES: usize = 15;

#[derive(Debug)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub click: String,
    pub tags: &'static str,
    pub priority: &'static str,
}

/// Thin ntfy client: one POST per notification, plain-text body.
#[derive(Clone)]
pub struct PushClient {
    client: Client,
    base_url: String,
}

impl PushClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub async fn post(&self, topic: &str, message: &PushMessage) -> Result<()> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), topic);
        let response = self
            .client
            .post(&url)
            .header("Title", &message.title)
            .header("Click", &message.click)
            .header("Tags", message.tags)
            .header("Priority", message.priority)
            .timeout(PUSH_TIMEOUT)
            .body(message.body.clone())
            .send()
            .await
            .context("push request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("push service returned {}", status);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Notifier {
    deals: DealsRepository,
    push: PushClient,
    index: Arc<MetroIndex>,
    global_topic: String,
    webapp_url: String,
    radius_km: f64,
}

impl Notifier {
    pub fn new(
        deals: DealsRepository,
        push: PushClient,
        index: Arc<MetroIndex>,
        global_topic: String,
        webapp_url: String,
        radius_km: f64,
    ) -> Self {
        Self {
            deals,
            push,
            index,
            global_topic,
            webapp_url,
            radius_km,
        }
    }

    /// The owner's topic when set, the global topic otherwise.
    fn resolve_topic(&self, owner: Option<&User>) -> Option<String> {
        if let Some(topic) = owner.and_then(|user| user.ntfy_topic.clone())
            && !topic.is_empty()
        {
            return Some(topic);
        }
        if self.global_topic.is_empty() {
            None
        } else {
            Some(self.global_topic.clone())
        }
    }

    async fn try_post(&self, topic: &str, message: PushMessage) -> bool {
        match self.push.post(topic, &message).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send push {:?}: {e:#}", message.title);
                false
            }
        }
    }

    /// Realtime alerts for deals the user has not seen yet. Every surfaced
    /// deal is marked notified afterwards, whether or not a push went out.
    pub async fn notify_new_deals(
        &self,
        profile: &SearchProfile,
        owner: Option<&User>,
    ) -> Result<()> {
        let views = self.deals.list_unnotified_views(profile.id).await?;
        if views.is_empty() {
            return Ok(());
        }

        let topic = self.resolve_topic(owner);
        if topic.is_none() {
            warn!(
                "No ntfy topic for profile {}, surfacing {} deal(s) silently",
                profile.name,
                views.len()
            );
        }

        // Views arrive cheapest-first, so the first deal per destination is
        // the one worth showing.
        let mut by_destination: Vec<&DealView> = Vec::new();
        let mut seen_destinations: HashSet<&str> = HashSet::new();
        for view in &views {
            if seen_destinations.insert(view.outbound.destination.as_str()) {
                by_destination.push(view);
            }
        }

        let belled: HashSet<String> = profile.notify_destination_codes()?.into_iter().collect();
        let mut sent = 0;

        if let Some(topic) = &topic {
            for view in by_destination
                .iter()
                .filter(|v| belled.contains(&v.outbound.destination))
            {
                let message = self.belled_message(profile, view);
                if self.try_post(topic, message).await {
                    sent += 1;
                }
            }

            let unbelled: Vec<&&DealView> = by_destination
                .iter()
                .filter(|v| !belled.contains(&v.outbound.destination))
                .collect();
            if !unbelled.is_empty() {
                let message = self.summary_message(profile, &unbelled);
                if self.try_post(topic, message).await {
                    sent += 1;
                }
            }
        }

        let ids: Vec<i32> = views.iter().map(|v| v.deal.id).collect();
        self.deals.mark_notified(ids).await?;

        info!("Sent {} push(es) for profile {}", sent, profile.name);
        Ok(())
    }

    fn belled_message(&self, profile: &SearchProfile, view: &DealView) -> PushMessage {
        let destination = &view.outbound.destination;
        let out_date = view.outbound.departure_time.format("%a %d %b");
        let in_date = view.inbound.departure_time.format("%a %d %b");
        PushMessage {
            title: format!("{} {:.0}EUR pp", view.destination_label(), view.deal.total_price_pp),
            body: format!(
                "{} -> {} {} / {}",
                view.outbound.origin, destination, out_date, in_date
            ),
            click: format!(
                "{}/?profile_id={}#deal-{}",
                self.webapp_url, profile.id, destination
            ),
            tags: "airplane",
            priority: "3",
        }
    }

    fn summary_message(&self, profile: &SearchProfile, unbelled: &[&&DealView]) -> PushMessage {
        let summary = unbelled
            .iter()
            .take(SUMMARY_TOP_N)
            .map(|view| format!("{} {:.0}€", view.destination_label(), view.deal.total_price_pp))
            .collect::<Vec<_>>()
            .join(" | ");
        PushMessage {
            title: format!("{}: {} new deals", profile.name, unbelled.len()),
            body: summary,
            click: format!("{}/?profile_id={}", self.webapp_url, profile.id),
            tags: "chart_with_upwards_trend",
            priority: "2",
        }
    }

    /// One aggregated push for the profile: cheapest deal per destination
    /// area, ascending by price. Destinations inside the same metro area
    /// collapse into their cheapest representative.
    pub async fn send_digest(&self, profile: &SearchProfile, owner: Option<&User>) -> Result<()> {
        let views = self.deals.list_views(profile.id).await?;
        if views.is_empty() {
            return Ok(());
        }
        let Some(topic) = self.resolve_topic(owner) else {
            return Ok(());
        };

        let mut taken: Vec<&DealView> = Vec::new();
        for view in &views {
            if taken.len() >= DIGEST_MAX_LINES {
                break;
            }
            let destination = view.outbound.destination.as_str();
            let duplicate = taken.iter().any(|t| {
                self.index
                    .are_nearby(t.outbound.destination.as_str(), destination, self.radius_km)
            });
            if !duplicate {
                taken.push(view);
            }
        }

        let body = taken
            .iter()
            .map(|view| {
                format!(
                    "{}: {:.0}EUR ({}-{})",
                    view.destination_label(),
                    view.deal.total_price_pp,
                    view.outbound.departure_time.format("%d/%m"),
                    view.inbound.departure_time.format("%d/%m"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let message = PushMessage {
            title: format!("Daily Flight Digest - {}", profile.name),
            body,
            click: format!("{}/", self.webapp_url),
            tags: "globe_with_meridians",
            priority: "3",
        };
        if self.try_post(&topic, message).await {
            info!("Daily digest sent for profile {}", profile.name);
        }
        Ok(())
    }
}
