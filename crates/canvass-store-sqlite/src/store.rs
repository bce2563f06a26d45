//! [`SqliteStore`]: the SQLite implementation of [`FeedbackStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use canvass_core::{
  credential::{AccessCredential, NewCredential},
  form::{Division, Form, FormDetail, FormStatus, NewForm, Question},
  job::DispatchReport,
  lifecycle::StatusChange,
  recipient::{
    NewRecipient, OverrideRoster, Recipient, RecipientKind, RosterKind, RosterSource,
  },
  store::FeedbackStore,
};

use crate::{
  Error, Result,
  encode::{
    CREDENTIAL_COLUMNS, FORM_COLUMNS, RawCredential, RawDivision, RawForm, RawQuestion,
    RawRecipient, RawRoster, decode_dt, decode_uuid, encode_dt, encode_question_kind,
    encode_roster_kind, encode_uuid,
  },
  schema::STORE_SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Canvass feedback store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(STORE_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Roster ingestion ──────────────────────────────────────────────────────
  //
  // Rosters are owned by the academic-entity subsystem; these are the write
  // paths its importers use.

  pub async fn add_division(&self, name: &str, semester: u8) -> Result<Division> {
    let division = Division {
      division_id: Uuid::new_v4(),
      name: name.to_owned(),
      semester,
    };

    let id_str = encode_uuid(division.division_id);
    let name = division.name.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO divisions (division_id, name, semester) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, name, semester],
        )?;
        Ok(())
      })
      .await?;

    Ok(division)
  }

  pub async fn add_student(&self, division_id: Uuid, input: NewRecipient) -> Result<Recipient> {
    let recipient = Recipient {
      recipient_id:  Uuid::new_v4(),
      kind:          RecipientKind::Student,
      name:          input.name,
      email:         input.email,
      enrollment_no: input.enrollment_no,
    };

    let id_str       = encode_uuid(recipient.recipient_id);
    let division_str = encode_uuid(division_id);
    let name         = recipient.name.clone();
    let email        = recipient.email.clone();
    let enrollment   = recipient.enrollment_no.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO students (student_id, division_id, name, email, enrollment_no)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, division_str, name, email, enrollment],
        )?;
        Ok(())
      })
      .await?;

    Ok(recipient)
  }

  /// Soft-delete a student. Returns `false` if already removed or unknown.
  pub async fn remove_student(&self, student_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(student_id);
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE students SET is_deleted = 1 WHERE student_id = ?1 AND is_deleted = 0",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(n > 0)
  }

  pub async fn create_override_roster(&self, form_id: Uuid, label: &str) -> Result<OverrideRoster> {
    let roster = OverrideRoster {
      roster_id:  Uuid::new_v4(),
      form_id,
      label:      label.to_owned(),
      is_deleted: false,
    };

    let id_str   = encode_uuid(roster.roster_id);
    let form_str = encode_uuid(form_id);
    let label    = roster.label.clone();

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO override_rosters (roster_id, form_id, label)
           SELECT ?1, ?2, ?3 WHERE EXISTS (SELECT 1 FROM forms WHERE form_id = ?2)",
          rusqlite::params![id_str, form_str, label],
        )?)
      })
      .await?;

    if n == 0 {
      return Err(Error::FormNotFound(form_id));
    }
    Ok(roster)
  }

  pub async fn remove_override_roster(&self, roster_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(roster_id);
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE override_rosters SET is_deleted = 1 WHERE roster_id = ?1 AND is_deleted = 0",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(n > 0)
  }

  pub async fn add_override_member(
    &self,
    roster_id: Uuid,
    input: NewRecipient,
  ) -> Result<Recipient> {
    let recipient = Recipient {
      recipient_id:  Uuid::new_v4(),
      kind:          RecipientKind::Override,
      name:          input.name,
      email:         input.email,
      enrollment_no: input.enrollment_no,
    };

    let id_str     = encode_uuid(recipient.recipient_id);
    let roster_str = encode_uuid(roster_id);
    let name       = recipient.name.clone();
    let email      = recipient.email.clone();
    let enrollment = recipient.enrollment_no.clone();

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO override_members (member_id, roster_id, name, email, enrollment_no)
           SELECT ?1, ?2, ?3, ?4, ?5
           WHERE EXISTS (SELECT 1 FROM override_rosters WHERE roster_id = ?2)",
          rusqlite::params![id_str, roster_str, name, email, enrollment],
        )?)
      })
      .await?;

    if n == 0 {
      return Err(Error::RosterNotFound(roster_id));
    }
    Ok(recipient)
  }

  pub async fn remove_override_member(&self, member_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(member_id);
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE override_members SET is_deleted = 1 WHERE member_id = ?1 AND is_deleted = 0",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(n > 0)
  }
}

// ─── FeedbackStore impl ──────────────────────────────────────────────────────

impl FeedbackStore for SqliteStore {
  type Error = Error;

  // ── Forms ─────────────────────────────────────────────────────────────────

  async fn create_form(&self, input: NewForm) -> Result<FormDetail> {
    let form = Form {
      form_id:               Uuid::new_v4(),
      title:                 input.title,
      division_id:           input.division_id,
      subject_allocation_id: input.subject_allocation_id,
      status:                FormStatus::Draft,
      is_expired:            false,
      start_date:            None,
      end_date:              None,
      created_at:            Utc::now(),
      is_deleted:            false,
    };

    let questions: Vec<Question> = input
      .questions
      .into_iter()
      .enumerate()
      .map(|(i, q)| Question {
        question_id: Uuid::new_v4(),
        form_id:     form.form_id,
        position:    i as u32,
        text:        q.text,
        kind:        q.kind,
      })
      .collect();

    let form_id_str     = encode_uuid(form.form_id);
    let title           = form.title.clone();
    let division_str    = encode_uuid(form.division_id);
    let allocation_str  = encode_uuid(form.subject_allocation_id);
    let status_str      = form.status.as_str();
    let created_at_str  = encode_dt(form.created_at);
    let question_rows: Vec<(String, u32, String, &'static str)> = questions
      .iter()
      .map(|q| {
        (
          encode_uuid(q.question_id),
          q.position,
          q.text.clone(),
          encode_question_kind(q.kind),
        )
      })
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO forms (
             form_id, title, division_id, subject_allocation_id, status, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            form_id_str,
            title,
            division_str,
            allocation_str,
            status_str,
            created_at_str,
          ],
        )?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO questions (question_id, form_id, position, text, kind)
             VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          for (id, position, text, kind) in &question_rows {
            stmt.execute(rusqlite::params![id, form_id_str, position, text, kind])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(FormDetail { form, questions })
  }

  async fn get_form(&self, form_id: Uuid) -> Result<Option<Form>> {
    let id_str = encode_uuid(form_id);

    let raw: Option<RawForm> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {FORM_COLUMNS} FROM forms WHERE form_id = ?1"),
            rusqlite::params![id_str],
            RawForm::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawForm::into_form).transpose()
  }

  async fn list_questions(&self, form_id: Uuid) -> Result<Vec<Question>> {
    let id_str = encode_uuid(form_id);

    let raws: Vec<RawQuestion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT question_id, form_id, position, text, kind
           FROM questions
           WHERE form_id = ?1 AND is_deleted = 0
           ORDER BY position",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawQuestion {
              question_id: row.get(0)?,
              form_id:     row.get(1)?,
              position:    row.get(2)?,
              text:        row.get(3)?,
              kind:        row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawQuestion::into_question).collect()
  }

  async fn set_form_status(
    &self,
    form_id:  Uuid,
    expected: FormStatus,
    change:   StatusChange,
  ) -> Result<Option<Form>> {
    let id_str       = encode_uuid(form_id);
    let expected_str = expected.as_str();
    let status_str   = change.status.as_str();
    let start_str    = change.start_date.map(encode_dt);
    let end_str      = change.end_date.map(encode_dt);

    let raw: Option<RawForm> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "UPDATE forms
               SET status     = ?1,
                   start_date = COALESCE(?2, start_date),
                   end_date   = COALESCE(?3, end_date)
               WHERE form_id = ?4 AND status = ?5 AND is_deleted = 0
               RETURNING {FORM_COLUMNS}"
            ),
            rusqlite::params![status_str, start_str, end_str, id_str, expected_str],
            RawForm::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawForm::into_form).transpose()
  }

  async fn soft_delete_form(&self, form_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(form_id);

    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let n = tx.execute(
          "UPDATE forms SET is_deleted = 1 WHERE form_id = ?1 AND is_deleted = 0",
          rusqlite::params![id_str],
        )?;
        if n == 0 {
          return Ok(false);
        }
        for sql in [
          "UPDATE questions        SET is_deleted = 1 WHERE form_id = ?1",
          "UPDATE override_rosters SET is_deleted = 1 WHERE form_id = ?1",
          "UPDATE credentials      SET is_deleted = 1 WHERE form_id = ?1",
          "UPDATE dispatch_log     SET is_deleted = 1 WHERE form_id = ?1",
        ] {
          tx.execute(sql, rusqlite::params![id_str])?;
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(deleted)
  }

  async fn mark_expired(&self, form_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(form_id);
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE forms SET is_expired = 1 WHERE form_id = ?1 AND is_expired = 0",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(n > 0)
  }

  async fn expire_forms_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
    let cutoff_str = encode_dt(cutoff);
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE forms SET is_expired = 1
           WHERE is_expired = 0 AND is_deleted = 0 AND created_at < ?1",
          rusqlite::params![cutoff_str],
        )?)
      })
      .await?;
    Ok(n)
  }

  // ── Rosters ───────────────────────────────────────────────────────────────

  async fn get_division(&self, division_id: Uuid) -> Result<Option<Division>> {
    let id_str = encode_uuid(division_id);

    let raw: Option<RawDivision> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT division_id, name, semester FROM divisions WHERE division_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawDivision {
                division_id: row.get(0)?,
                name:        row.get(1)?,
                semester:    row.get(2)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawDivision::into_division).transpose()
  }

  async fn find_override_roster(&self, form_id: Uuid) -> Result<Option<OverrideRoster>> {
    let id_str = encode_uuid(form_id);

    let raw: Option<RawRoster> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT roster_id, form_id, label, is_deleted
             FROM override_rosters WHERE form_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawRoster {
                roster_id:  row.get(0)?,
                form_id:    row.get(1)?,
                label:      row.get(2)?,
                is_deleted: row.get(3)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawRoster::into_roster).transpose()
  }

  async fn list_active_recipients(&self, source: RosterSource) -> Result<Vec<Recipient>> {
    let (sql, id, kind) = match source {
      RosterSource::Division(id) => (
        "SELECT student_id, name, email, enrollment_no
         FROM students
         WHERE division_id = ?1 AND is_deleted = 0
         ORDER BY enrollment_no",
        id,
        RecipientKind::Student,
      ),
      RosterSource::Override(id) => (
        "SELECT member_id, name, email, enrollment_no
         FROM override_members
         WHERE roster_id = ?1 AND is_deleted = 0
         ORDER BY enrollment_no",
        id,
        RecipientKind::Override,
      ),
    };
    let id_str = encode_uuid(id);

    let raws: Vec<RawRecipient> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawRecipient {
              recipient_id:  row.get(0)?,
              name:          row.get(1)?,
              email:         row.get(2)?,
              enrollment_no: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|r| r.into_recipient(kind)).collect()
  }

  // ── Credentials ───────────────────────────────────────────────────────────

  async fn find_credential(&self, token: &str) -> Result<Option<AccessCredential>> {
    let token = token.to_owned();

    let raw: Option<RawCredential> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE token = ?1"),
            rusqlite::params![token],
            RawCredential::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCredential::into_credential).transpose()
  }

  async fn upsert_credential(&self, input: NewCredential) -> Result<AccessCredential> {
    let id_str        = encode_uuid(Uuid::new_v4());
    let form_str      = encode_uuid(input.form_id);
    let kind_str      = input.recipient_kind.as_str();
    let recipient_str = encode_uuid(input.recipient_id);
    let created_str   = encode_dt(Utc::now());
    let token         = input.token;

    let raw: RawCredential = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO credentials (
               credential_id, form_id, recipient_kind, recipient_id, token, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (form_id, recipient_kind, recipient_id)
               DO UPDATE SET is_deleted = 0
             RETURNING {CREDENTIAL_COLUMNS}"
          ),
          rusqlite::params![id_str, form_str, kind_str, recipient_str, token, created_str],
          RawCredential::from_row,
        )?)
      })
      .await?;

    raw.into_credential()
  }

  async fn mark_submitted(&self, credential_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(credential_id);
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE credentials SET is_submitted = 1
           WHERE credential_id = ?1 AND is_submitted = 0",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(n > 0)
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  async fn record_dispatch(&self, report: DispatchReport) -> Result<()> {
    let form_str = encode_uuid(report.form_id);
    let kind_str = encode_roster_kind(report.roster_kind);
    let at_str   = encode_dt(report.dispatched_at);
    let counts   = [
      report.recipients as i64,
      report.enqueued as i64,
      report.sent_directly as i64,
      report.skipped as i64,
      report.failed as i64,
    ];

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO dispatch_log (
             form_id, roster_kind, recipients, enqueued, sent_directly, skipped, failed,
             dispatched_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            form_str, kind_str, counts[0], counts[1], counts[2], counts[3], counts[4], at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_dispatches(&self, form_id: Uuid) -> Result<Vec<DispatchReport>> {
    let id_str = encode_uuid(form_id);

    let rows: Vec<(String, String, [i64; 5], String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT form_id, roster_kind, recipients, enqueued, sent_directly, skipped, failed,
                  dispatched_at
           FROM dispatch_log
           WHERE form_id = ?1 AND is_deleted = 0
           ORDER BY dispatch_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok((
              row.get(0)?,
              row.get(1)?,
              [row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?],
              row.get(7)?,
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(form_id, kind, counts, at)| {
        let roster_kind = match kind.as_str() {
          "division" => RosterKind::Division,
          "override" => RosterKind::Override,
          other => {
            return Err(Error::UnknownValue {
              column: "dispatch_log.roster_kind",
              value:  other.to_owned(),
            });
          }
        };
        Ok(DispatchReport {
          form_id: decode_uuid(&form_id)?,
          roster_kind,
          recipients: counts[0] as usize,
          enqueued: counts[1] as usize,
          sent_directly: counts[2] as usize,
          skipped: counts[3] as usize,
          failed: counts[4] as usize,
          dispatched_at: decode_dt(&at)?,
        })
      })
      .collect()
  }
}
