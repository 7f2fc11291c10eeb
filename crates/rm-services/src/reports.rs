//! Reports and moderation.

use std::sync::Arc;

use rm_core::clock::Clock;
use rm_core::error::{MarketError, Result};
use rm_core::models::{ChatChannel, Report, ReportKind};
use rm_core::traits::{ChatRepo, ProductRepo, ReportRepo, UserRepo};
use rm_core::validation;
use uuid::Uuid;

use crate::access::{parse_id, require_admin, update_product_with};

pub struct ReportService {
    users: Arc<dyn UserRepo>,
    products: Arc<dyn ProductRepo>,
    reports: Arc<dyn ReportRepo>,
    chat: Arc<dyn ChatRepo>,
    clock: Arc<dyn Clock>,
}

impl ReportService {
    pub fn new(
        users: Arc<dyn UserRepo>,
        products: Arc<dyn ProductRepo>,
        reports: Arc<dyn ReportRepo>,
        chat: Arc<dyn ChatRepo>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            products,
            reports,
            chat,
            clock,
        }
    }

    /// Files a report. The content id is ignored for user reports and
    /// required for every other kind; the content must belong to
    /// `reported_user`. Identical reports are not merged.
    pub async fn report_content(
        &self,
        kind: ReportKind,
        content_id: Option<&str>,
        reported_user: &str,
        reason: &str,
        reporter: &str,
    ) -> Result<Report> {
        let reason = validation::report_reason(reason)?;
        if self.users.get_user(reporter).await?.is_none() {
            return Err(MarketError::NotAuthenticated);
        }
        if reporter == reported_user {
            return Err(MarketError::forbidden("you cannot report yourself"));
        }
        if self.users.get_user(reported_user).await?.is_none() {
            return Err(MarketError::NotFound("user", reported_user.to_string()));
        }

        let content_id = if kind.needs_content_id() {
            let raw = content_id
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    MarketError::validation("contentId", format!("required for {kind} reports"))
                })?;
            let id = parse_id("contentId", raw)?;
            self.check_content(kind, id, reported_user).await?;
            Some(id.to_string())
        } else {
            None
        };

        let report = Report {
            id: Uuid::now_v7(),
            kind,
            content_id,
            reported_user: reported_user.to_string(),
            reason: validation::sanitize(&reason),
            reported_by: reporter.to_string(),
            created_at: self.clock.now(),
        };
        self.reports.insert_report(report.clone()).await?;
        tracing::info!(report_id = %report.id, %kind, reported_user, reporter, "report filed");
        Ok(report)
    }

    async fn check_content(&self, kind: ReportKind, id: Uuid, owner: &str) -> Result<()> {
        let author = match kind {
            ReportKind::Product => self.products.get_product(id).await?.map(|p| p.author),
            ReportKind::Post => self
                .chat
                .get_message(id)
                .await?
                .filter(|m| m.channel == ChatChannel::Public)
                .map(|m| m.author),
            ReportKind::Chat => self
                .chat
                .get_message(id)
                .await?
                .filter(|m| m.channel != ChatChannel::Public)
                .map(|m| m.author),
            ReportKind::User => return Ok(()),
        };
        match author {
            Some(author) if author == owner => Ok(()),
            Some(_) => Err(MarketError::validation(
                "contentId",
                format!("{kind} {id} does not belong to {owner}"),
            )),
            None => Err(MarketError::NotFound("content", id.to_string())),
        }
    }

    /// Moderation queue, oldest first.
    pub async fn list_reports(&self, actor: &str) -> Result<Vec<Report>> {
        require_admin(&*self.users, actor, self.clock.now()).await?;
        Ok(self.reports.list_reports().await?)
    }

    pub async fn dismiss_report(&self, report_id: Uuid, actor: &str) -> Result<Report> {
        require_admin(&*self.users, actor, self.clock.now()).await?;
        let report = self
            .reports
            .remove_report(report_id)
            .await?
            .ok_or_else(|| MarketError::NotFound("report", report_id.to_string()))?;
        tracing::info!(report_id = %report_id, by = actor, "report dismissed");
        Ok(report)
    }

    /// Removes the reported content, then the report. User reports have
    /// no side effect here; a ban is a separate call.
    pub async fn act_on_report(&self, report_id: Uuid, actor: &str) -> Result<Report> {
        require_admin(&*self.users, actor, self.clock.now()).await?;
        let report = self
            .reports
            .get_report(report_id)
            .await?
            .ok_or_else(|| MarketError::NotFound("report", report_id.to_string()))?;

        let target = report
            .content_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok());
        match (report.kind, target) {
            (ReportKind::User, _) => {}
            (ReportKind::Product, Some(id)) => {
                match update_product_with(&*self.products, id, |p| {
                    let changed = !p.is_deleted;
                    p.is_deleted = true;
                    Ok(changed)
                })
                .await
                {
                    Ok(_) => {}
                    Err(MarketError::NotFound(..)) => {
                        tracing::warn!(report_id = %report_id, product_id = %id, "reported product already gone");
                    }
                    Err(e) => return Err(e),
                }
            }
            (ReportKind::Post | ReportKind::Chat, Some(id)) => {
                if self.chat.remove_message(id).await?.is_none() {
                    tracing::warn!(report_id = %report_id, message_id = %id, "reported message already gone");
                }
            }
            (kind, None) => {
                tracing::warn!(report_id = %report_id, %kind, "report has no usable content id");
            }
        }

        self.reports.remove_report(report_id).await?;
        tracing::info!(report_id = %report_id, kind = %report.kind, by = actor, "report acted on");
        Ok(report)
    }
}
