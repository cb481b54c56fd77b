use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{sea_query::OnConflict, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{entities::newsletter_subscription, errors::ServiceError};

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// Whether the address was stored or only acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    Stored,
    Recorded,
}

impl Subscription {
    pub fn message(self) -> &'static str {
        match self {
            Subscription::Stored => "Successfully subscribed",
            Subscription::Recorded => "Subscription recorded",
        }
    }
}

#[derive(Clone)]
pub struct NewsletterService {
    db: Arc<DatabaseConnection>,
}

impl NewsletterService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Storage failures are logged and still acknowledged to the subscriber
    #[instrument(skip(self, email))]
    pub async fn subscribe(&self, email: &str) -> Result<Subscription, ServiceError> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(ServiceError::BadRequest("Valid email required".to_string()));
        }

        let row = newsletter_subscription::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_lowercase()),
            created_at: Set(Utc::now()),
        };
        let stored = newsletter_subscription::Entity::insert(row)
            .on_conflict(
                OnConflict::column(newsletter_subscription::Column::Email)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await;

        match stored {
            Ok(_) => {
                info!("newsletter subscription stored");
                Ok(Subscription::Stored)
            }
            Err(e) => {
                error!(error = %e, "newsletter subscription not stored");
                Ok(Subscription::Recorded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use sea_orm::{EntityTrait, PaginatorTrait};

    #[rstest]
    #[case("priya@example.com", true)]
    #[case("a.b@c.in", true)]
    #[case("no-at-sign.com", false)]
    #[case("spaces in@example.com", false)]
    #[case("missing@tld", false)]
    fn email_pattern(#[case] email: &str, #[case] valid: bool) {
        assert_eq!(is_valid_email(email), valid);
    }

    #[tokio::test]
    async fn subscriptions_are_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("news.sqlite").display());
        let db = Arc::new(crate::db::establish_connection(&url).await.unwrap());
        crate::db::run_migrations(&db).await.unwrap();
        let service = NewsletterService::new(db.clone());

        assert_eq!(service.subscribe("Priya@Example.com").await.unwrap(), Subscription::Stored);
        assert_eq!(service.subscribe("priya@example.com").await.unwrap(), Subscription::Stored);
        assert_eq!(
            newsletter_subscription::Entity::find().count(&*db).await.unwrap(),
            1
        );
        assert!(service.subscribe("bogus").await.is_err());
    }
}
