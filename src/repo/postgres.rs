use async_trait::async_trait;

use chrono::{DateTime, Utc};

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Article, Message, Newsletter, Submission, Subscription, UserRef};

use super::{ContentStore, RecipientStore, SubmissionStore};

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn recipients_of(&self, submission_id: Uuid) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "select subscription_id from submission_recipients \
             where submission_id = $1 order by subscription_id",
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get("subscription_id").map_err(Error::from))
            .collect()
    }
}

/// Map unique-constraint violations to validation errors; uniqueness of
/// subscriptions and publishable submissions is enforced by the schema
fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> Error {
    move |e| {
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some("23505") {
                return Error::Validation(context.into());
            }
        }
        Error::Database(e)
    }
}

fn newsletter_from_row(row: &PgRow) -> Result<Newsletter> {
    Ok(Newsletter {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        sender: row.try_get("sender")?,
        email: row.try_get::<String, _>("email")?.parse()?,
        visible: row.try_get("visible")?,
        send_html: row.try_get("send_html")?,
        sites: row.try_get("sites")?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription> {
    let user = match (
        row.try_get::<Option<Uuid>, _>("user_id")?,
        row.try_get::<Option<String>, _>("user_name")?,
        row.try_get::<Option<String>, _>("user_email")?,
    ) {
        (Some(id), Some(name), Some(email)) => Some(UserRef {
            id,
            name,
            email: email.parse()?,
        }),
        _ => None,
    };

    let email = row
        .try_get::<Option<String>, _>("email")?
        .map(|e| e.parse())
        .transpose()?;
    let name = row
        .try_get::<Option<String>, _>("name")?
        .map(|n| n.parse())
        .transpose()?;
    let ip = row
        .try_get::<Option<String>, _>("ip")?
        .map(|ip| {
            ip.parse()
                .map_err(|_| Error::Parsing(format!("Invalid IP address: {}", ip)))
        })
        .transpose()?;

    Ok(Subscription {
        id: row.try_get("id")?,
        newsletter_id: row.try_get("newsletter_id")?,
        user,
        name,
        email,
        ip,
        create_date: row.try_get("create_date")?,
        activation_code: row.try_get::<String, _>("activation_code")?.parse()?,
        status: row.try_get::<String, _>("status")?.parse()?,
        subscribe_date: row.try_get("subscribe_date")?,
        unsubscribe_date: row.try_get("unsubscribe_date")?,
    })
}

fn submission_from_row(row: &PgRow) -> Result<Submission> {
    Ok(Submission {
        id: row.try_get("id")?,
        newsletter_id: row.try_get("newsletter_id")?,
        message_id: row.try_get("message_id")?,
        recipients: Vec::new(),
        publish_date: row.try_get("publish_date")?,
        publish: row.try_get("publish")?,
        prepared: row.try_get("prepared")?,
        sent: row.try_get("sent")?,
        sending: row.try_get("sending")?,
    })
}

#[async_trait]
impl ContentStore for PgStore {
    #[tracing::instrument(name = "Fetch newsletter", skip(self))]
    async fn newsletter(&self, id: Uuid) -> Result<Option<Newsletter>> {
        let row = sqlx::query(
            "select id, title, slug, sender, email, visible, send_html, sites \
             from newsletters where id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(newsletter_from_row).transpose()
    }

    #[tracing::instrument(name = "Fetch message", skip(self))]
    async fn message(&self, id: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query(
            "select id, title, slug, newsletter_id, date_create, date_modify \
             from messages where id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut message = Message {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            newsletter_id: row.try_get("newsletter_id")?,
            articles: Vec::new(),
            date_create: row.try_get("date_create")?,
            date_modify: row.try_get("date_modify")?,
        };

        let article_rows = sqlx::query(
            "select sortorder, title, text, url from articles \
             where message_id = $1 order by sortorder",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let articles = article_rows
            .iter()
            .map(|row| -> Result<Article> {
                let url = row
                    .try_get::<Option<String>, _>("url")?
                    .map(|u| {
                        u.parse()
                            .map_err(|_| Error::Parsing(format!("Invalid article URL: {}", u)))
                    })
                    .transpose()?;
                Ok(Article {
                    sortorder: row.try_get::<i32, _>("sortorder")? as u32,
                    title: row.try_get("title")?,
                    text: row.try_get("text")?,
                    url,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        message.set_articles(articles);
        Ok(Some(message))
    }
}

#[async_trait]
impl RecipientStore for PgStore {
    #[tracing::instrument(name = "Save subscription", skip(self, subscription), fields(subscription = %subscription.id))]
    async fn save(&self, subscription: &Subscription) -> Result<()> {
        subscription.validate()?;

        sqlx::query(
            "insert into subscriptions \
             (id, newsletter_id, user_id, user_name, user_email, name, email, ip, \
              create_date, activation_code, status, subscribe_date, unsubscribe_date) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             on conflict (id) do update set \
               user_id = excluded.user_id, \
               user_name = excluded.user_name, \
               user_email = excluded.user_email, \
               name = excluded.name, \
               email = excluded.email, \
               ip = excluded.ip, \
               status = excluded.status, \
               subscribe_date = excluded.subscribe_date, \
               unsubscribe_date = excluded.unsubscribe_date",
        )
        .bind(subscription.id)
        .bind(subscription.newsletter_id)
        .bind(subscription.user.as_ref().map(|u| u.id))
        .bind(subscription.user.as_ref().map(|u| u.name.clone()))
        .bind(subscription.user.as_ref().map(|u| u.email.to_string()))
        .bind(subscription.name.as_ref().map(ToString::to_string))
        .bind(subscription.email.as_ref().map(ToString::to_string))
        .bind(subscription.ip.map(|ip| ip.to_string()))
        .bind(subscription.create_date)
        .bind(subscription.activation_code.to_string())
        .bind(subscription.status.as_str())
        .bind(subscription.subscribe_date)
        .bind(subscription.unsubscribe_date)
        .execute(&self.pool)
        .await
        .map_err(db_error(
            "A subscription for this e-mail address already exists",
        ))?;

        Ok(())
    }

    #[tracing::instrument(name = "Fetch subscription", skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Subscription>> {
        let row = sqlx::query("select * from subscriptions where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    #[tracing::instrument(name = "Fetch subscribed recipients", skip(self))]
    async fn subscribed_for(&self, newsletter_id: Uuid) -> Result<Vec<Subscription>> {
        let rows = sqlx::query(
            "select * from subscriptions \
             where newsletter_id = $1 and status = 'subscribed' order by id",
        )
        .bind(newsletter_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(subscription_from_row).collect()
    }

    #[tracing::instrument(name = "Filter subscribed recipients", skip(self, ids))]
    async fn subscribed_among(&self, ids: &[Uuid]) -> Result<Vec<Subscription>> {
        let rows = sqlx::query(
            "select * from subscriptions \
             where id = any($1) and status = 'subscribed' order by id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(subscription_from_row).collect()
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    #[tracing::instrument(name = "Insert submission", skip(self, submission), fields(submission = %submission.id))]
    async fn insert(&self, submission: &Submission) -> Result<()> {
        sqlx::query(
            "insert into submissions \
             (id, newsletter_id, message_id, publish_date, publish, prepared, sent, sending) \
             values \
             ($1, coalesce((select newsletter_id from messages where id = $3), $2), \
              $3, $4, $5, $6, $7, $8)",
        )
        .bind(submission.id)
        .bind(submission.newsletter_id)
        .bind(submission.message_id)
        .bind(submission.publish_date)
        .bind(submission.publish)
        .bind(submission.prepared)
        .bind(submission.sent)
        .bind(submission.sending)
        .execute(&self.pool)
        .await
        .map_err(db_error(
            "A publishable submission already exists for this message",
        ))?;

        Ok(())
    }

    #[tracing::instrument(name = "Save submission", skip(self, submission), fields(submission = %submission.id))]
    async fn save(&self, submission: &Submission) -> Result<()> {
        let result = sqlx::query(
            "update submissions set \
               newsletter_id = coalesce((select newsletter_id from messages where id = $3), $2), \
               message_id = $3, \
               publish_date = $4, \
               publish = $5, \
               prepared = $6, \
               sent = $7, \
               sending = $8 \
             where id = $1",
        )
        .bind(submission.id)
        .bind(submission.newsletter_id)
        .bind(submission.message_id)
        .bind(submission.publish_date)
        .bind(submission.publish)
        .bind(submission.prepared)
        .bind(submission.sent)
        .bind(submission.sending)
        .execute(&self.pool)
        .await
        .map_err(db_error(
            "A publishable submission already exists for this message",
        ))?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Submission", submission.id));
        }
        Ok(())
    }

    #[tracing::instrument(name = "Fetch submission", skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Submission>> {
        let row = sqlx::query("select * from submissions where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut submission = submission_from_row(&row)?;
        submission.recipients = self.recipients_of(submission.id).await?;
        Ok(Some(submission))
    }

    #[tracing::instrument(name = "Set submission recipients", skip(self, recipients))]
    async fn set_recipients(&self, id: Uuid, recipients: &[Uuid]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("delete from submission_recipients where submission_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "insert into submission_recipients (submission_id, subscription_id) \
             select $1, unnest($2::uuid[])",
        )
        .bind(id)
        .bind(recipients)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(name = "Fetch due submissions", skip(self))]
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Submission>> {
        let rows = sqlx::query(
            "select * from submissions \
             where prepared and not sent and not sending and publish_date < $1 \
             order by publish_date, id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut submissions = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut submission = submission_from_row(row)?;
            submission.recipients = self.recipients_of(submission.id).await?;
            submissions.push(submission);
        }
        Ok(submissions)
    }

    #[tracing::instrument(name = "Claim submission for sending", skip(self))]
    async fn claim(&self, id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            "update submissions set sending = true \
             where id = $1 and prepared and not sent and not sending \
             returning id",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    #[tracing::instrument(name = "Release submission claim", skip(self))]
    async fn release(&self, id: Uuid) -> Result<()> {
        sqlx::query("update submissions set sending = false where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(name = "Mark submission sent", skip(self))]
    async fn mark_sent(&self, id: Uuid) -> Result<()> {
        sqlx::query("update submissions set sending = false, sent = true where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
