use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AdminIdentity, Admission, AdmissionForm, BankDetails, BankDetailsUpdate, ContactMessage, News,
    NewsUpdate,
};

/// Attempts at drawing an unused admission reference before giving up.
const REFERENCE_ATTEMPTS: usize = 16;
const BANK_KEY: &[u8] = b"current";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("username {0:?} is already provisioned")]
    DuplicateUsername(String),

    #[error("no unused admission reference after {0} attempts")]
    ReferenceExhausted(usize),

    #[error("corrupt record in tree {0}")]
    Corrupt(String),
}

/// Sled-backed document store, one tree per collection.
///
/// Cheap to clone; sled handles are reference counted and internally
/// synchronized.
#[derive(Clone)]
pub struct Storage {
    db: Db,
    admins: sled::Tree,
    // username -> admin id, used as the uniqueness index
    admin_usernames: sled::Tree,
    admissions: sled::Tree,
    // reference -> admission id
    admission_refs: sled::Tree,
    messages: sled::Tree,
    news: sled::Tree,
    bank: sled::Tree,
}

impl Storage {
    /// Open or create the Sled database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory database removed on drop. Used by tests and dry runs.
    pub fn temporary() -> Result<Self, StorageError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        Ok(Self {
            admins: db.open_tree("admins")?,
            admin_usernames: db.open_tree("admin_usernames")?,
            admissions: db.open_tree("admissions")?,
            admission_refs: db.open_tree("admission_refs")?,
            messages: db.open_tree("messages")?,
            news: db.open_tree("news")?,
            bank: db.open_tree("bank")?,
            db,
        })
    }

    pub async fn flush(&self) -> Result<(), StorageError> {
        self.db.flush_async().await?;
        Ok(())
    }

    // --- Credential store ---

    /// Insert a new admin identity. Usernames are unique, compared exactly.
    /// The username index and the record are written in one transaction.
    pub fn create_admin(&self, identity: &AdminIdentity) -> Result<(), StorageError> {
        let record = serde_json::to_vec(identity)?;
        let username = identity.username.as_bytes();
        let id = &identity.id.as_bytes()[..];
        let result: Result<(), TransactionError<()>> = (&self.admin_usernames, &self.admins)
            .transaction(|(usernames, admins)| {
                if usernames.get(username)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(()));
                }
                usernames.insert(username, id)?;
                admins.insert(id, record.as_slice())?;
                Ok(())
            });
        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(())) => {
                Err(StorageError::DuplicateUsername(identity.username.clone()))
            }
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    /// Case-sensitive exact lookup.
    pub fn find_admin_by_username(&self, username: &str) -> Result<Option<AdminIdentity>, StorageError> {
        let Some(id) = self.admin_usernames.get(username.as_bytes())? else {
            return Ok(None);
        };
        match self.admins.get(&id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Err(StorageError::Corrupt("admins".to_string())),
        }
    }

    // --- Admissions ---

    /// Store a submitted form under a freshly drawn `MNI-NNNNNN` reference.
    pub fn insert_admission(
        &self,
        form: AdmissionForm,
        submitted_at: DateTime<Utc>,
    ) -> Result<Admission, StorageError> {
        self.insert_admission_with(form, submitted_at, generate_reference)
    }

    fn insert_admission_with<G>(
        &self,
        form: AdmissionForm,
        submitted_at: DateTime<Utc>,
        mut next_reference: G,
    ) -> Result<Admission, StorageError>
    where
        G: FnMut() -> String,
    {
        let id = Uuid::new_v4();
        for _ in 0..REFERENCE_ATTEMPTS {
            let reference = next_reference();
            let claimed = self.admission_refs.compare_and_swap(
                reference.as_bytes(),
                None::<&[u8]>,
                Some(id.as_bytes().to_vec()),
            )?;
            if claimed.is_ok() {
                let mut admission = Admission::from_form(form, reference, submitted_at);
                admission.id = id;
                put(&self.admissions, id.as_bytes(), &admission)?;
                return Ok(admission);
            }
            tracing::debug!(%reference, "admission reference collision, drawing again");
        }
        Err(StorageError::ReferenceExhausted(REFERENCE_ATTEMPTS))
    }

    /// All admissions, most recent first.
    pub fn list_admissions(&self) -> Result<Vec<Admission>, StorageError> {
        let mut admissions: Vec<Admission> = scan(&self.admissions)?;
        admissions.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(admissions)
    }

    // --- Contact messages ---

    pub fn insert_message(&self, message: &ContactMessage) -> Result<(), StorageError> {
        put(&self.messages, message.id.as_bytes(), message)
    }

    /// All messages, most recent first.
    pub fn list_messages(&self) -> Result<Vec<ContactMessage>, StorageError> {
        let mut messages: Vec<ContactMessage> = scan(&self.messages)?;
        messages.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(messages)
    }

    // --- News ---

    pub fn insert_news(&self, news: &News) -> Result<(), StorageError> {
        put(&self.news, news.id.as_bytes(), news)
    }

    /// News ordered by date, newest first. Hidden posts are dropped unless
    /// `include_hidden` is set.
    pub fn list_news(&self, include_hidden: bool) -> Result<Vec<News>, StorageError> {
        let mut news: Vec<News> = scan(&self.news)?;
        if !include_hidden {
            news.retain(|n| n.visible);
        }
        news.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(news)
    }

    /// Apply a partial update; `None` when the post does not exist. A post
    /// deleted concurrently stays deleted.
    pub fn update_news(&self, id: Uuid, update: NewsUpdate) -> Result<Option<News>, StorageError> {
        rewrite(&self.news, id.as_bytes(), |current: Option<News>| {
            current.map(|mut news| {
                update.clone().apply(&mut news);
                news
            })
        })
    }

    /// Returns whether a post was removed.
    pub fn delete_news(&self, id: Uuid) -> Result<bool, StorageError> {
        Ok(self.news.remove(id.as_bytes())?.is_some())
    }

    // --- Bank details ---

    pub fn bank_details(&self) -> Result<Option<BankDetails>, StorageError> {
        self.bank.get(BANK_KEY)?.map(|bytes| decode(&bytes)).transpose()
    }

    /// Create the record or merge into the existing one.
    pub fn update_bank_details(
        &self,
        update: BankDetailsUpdate,
        now: DateTime<Utc>,
    ) -> Result<BankDetails, StorageError> {
        rewrite(&self.bank, BANK_KEY, |current| Some(update.clone().merge_into(current, now)))?
            .ok_or_else(|| StorageError::Corrupt("bank".to_string()))
    }
}

/// `MNI-` plus a six digit number in 100000..=999999.
pub fn generate_reference() -> String {
    let n = Uuid::new_v4().as_u128() % 900_000 + 100_000;
    format!("MNI-{n}")
}

fn put<T: Serialize>(tree: &sled::Tree, key: &[u8], value: &T) -> Result<(), StorageError> {
    tree.insert(key, serde_json::to_vec(value)?)?;
    Ok(())
}

/// Atomic read-modify-write of one record. `f` may run more than once when
/// writers race; returning `None` for an absent key leaves it absent.
fn rewrite<T, F>(tree: &sled::Tree, key: &[u8], mut f: F) -> Result<Option<T>, StorageError>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Option<T>) -> Option<T>,
{
    let mut failure = None;
    let stored = tree.update_and_fetch(key, |old| {
        failure = None;
        let current = match old.map(decode::<T>).transpose() {
            Ok(current) => current,
            Err(e) => {
                failure = Some(e);
                return old.map(<[u8]>::to_vec);
            }
        };
        match f(current).map(|next| serde_json::to_vec(&next)).transpose() {
            Ok(next) => next,
            Err(e) => {
                failure = Some(StorageError::from(e));
                old.map(<[u8]>::to_vec)
            }
        }
    })?;
    if let Some(e) = failure {
        return Err(e);
    }
    stored.map(|bytes| decode(&bytes)).transpose()
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn scan<T: DeserializeOwned>(tree: &sled::Tree) -> Result<Vec<T>, StorageError> {
    tree.iter()
        .values()
        .map(|value| decode(&value?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContactForm, NewsDraft};
    use chrono::Duration;

    fn form(first_name: &str) -> AdmissionForm {
        AdmissionForm {
            first_name: first_name.into(),
            last_name: "Rao".into(),
            email: "applicant@example.com".into(),
            phone: "9999999999".into(),
            ..Default::default()
        }
    }

    fn identity(username: &str) -> AdminIdentity {
        AdminIdentity {
            id: Uuid::new_v4(),
            username: username.into(),
            password_hash: "hash".into(),
            is_admin: true,
        }
    }

    #[test]
    fn test_admin_lookup_is_exact_and_unique() {
        let storage = Storage::temporary().expect("Failed to open storage");
        storage.create_admin(&identity("admin")).unwrap();

        assert!(storage.find_admin_by_username("admin").unwrap().is_some());
        assert!(storage.find_admin_by_username("Admin").unwrap().is_none());
        assert!(storage.find_admin_by_username("admin ").unwrap().is_none());

        let duplicate = identity("admin");
        let err = storage.create_admin(&duplicate).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateUsername(name) if name == "admin"));
        assert!(storage.admins.get(duplicate.id.as_bytes()).unwrap().is_none());
        assert_eq!(storage.admins.len(), 1);
        assert_eq!(storage.admin_usernames.len(), 1);
    }

    #[test]
    fn test_reference_format() {
        for _ in 0..100 {
            let reference = generate_reference();
            let digits = reference.strip_prefix("MNI-").expect("prefix");
            let n: u32 = digits.parse().expect("numeric");
            assert!((100_000..=999_999).contains(&n));
        }
    }

    #[test]
    fn test_admission_reference_collision_redraws() {
        let storage = Storage::temporary().unwrap();
        let mut draws = vec!["MNI-222222", "MNI-111111", "MNI-111111"];
        let mut next = || draws.pop().unwrap().to_string();

        let first = storage.insert_admission_with(form("A"), Utc::now(), &mut next).unwrap();
        let second = storage.insert_admission_with(form("B"), Utc::now(), &mut next).unwrap();
        assert_eq!(first.unique_key, "MNI-111111");
        assert_eq!(second.unique_key, "MNI-222222");
    }

    #[test]
    fn test_admission_reference_exhaustion() {
        let storage = Storage::temporary().unwrap();
        storage
            .insert_admission_with(form("A"), Utc::now(), || "MNI-123456".to_string())
            .unwrap();
        let err = storage
            .insert_admission_with(form("B"), Utc::now(), || "MNI-123456".to_string())
            .unwrap_err();
        assert!(matches!(err, StorageError::ReferenceExhausted(REFERENCE_ATTEMPTS)));
        assert_eq!(storage.list_admissions().unwrap().len(), 1);
    }

    #[test]
    fn test_admissions_newest_first() {
        let storage = Storage::temporary().unwrap();
        let now = Utc::now();
        storage.insert_admission(form("Old"), now - Duration::days(2)).unwrap();
        storage.insert_admission(form("New"), now).unwrap();
        storage.insert_admission(form("Mid"), now - Duration::days(1)).unwrap();

        let names: Vec<String> = storage
            .list_admissions()
            .unwrap()
            .into_iter()
            .map(|a| a.first_name)
            .collect();
        assert_eq!(names, ["New", "Mid", "Old"]);
    }

    #[test]
    fn test_messages_newest_first() {
        let storage = Storage::temporary().unwrap();
        let now = Utc::now();
        for (name, age) in [("b", 1), ("a", 3), ("c", 0)] {
            let form = ContactForm {
                name: name.into(),
                email: "x@y.z".into(),
                phone: None,
                subject: None,
                message: "hello".into(),
            };
            storage
                .insert_message(&ContactMessage::from_form(form, now - Duration::hours(age)))
                .unwrap();
        }
        let names: Vec<String> = storage.list_messages().unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, ["c", "b", "a"]);
    }

    #[test]
    fn test_news_visibility_update_and_delete() {
        let storage = Storage::temporary().unwrap();
        let now = Utc::now();
        let shown = NewsDraft {
            title: "Shown".into(),
            description: String::new(),
            image_url: None,
            visible: None,
        }
        .into_news(now);
        let hidden = NewsDraft {
            title: "Hidden".into(),
            description: String::new(),
            image_url: None,
            visible: Some(false),
        }
        .into_news(now - Duration::minutes(5));
        storage.insert_news(&shown).unwrap();
        storage.insert_news(&hidden).unwrap();

        assert_eq!(storage.list_news(false).unwrap(), vec![shown.clone()]);
        assert_eq!(storage.list_news(true).unwrap().len(), 2);

        let update = NewsUpdate {
            visible: Some(true),
            ..Default::default()
        };
        let updated = storage.update_news(hidden.id, update).unwrap().unwrap();
        assert!(updated.visible);
        assert_eq!(storage.list_news(false).unwrap().len(), 2);

        assert!(storage.update_news(Uuid::new_v4(), NewsUpdate::default()).unwrap().is_none());

        assert!(storage.delete_news(shown.id).unwrap());
        assert!(!storage.delete_news(shown.id).unwrap());
        assert_eq!(storage.list_news(true).unwrap(), vec![updated]);
    }

    #[test]
    fn test_bank_details_create_then_merge() {
        let storage = Storage::temporary().unwrap();
        assert!(storage.bank_details().unwrap().is_none());

        let created = storage
            .update_bank_details(
                BankDetailsUpdate {
                    bank_name: Some(Some("State Bank".into())),
                    qr_code_url: Some(Some("https://cdn.example.com/qr.png".into())),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();

        let merged = storage
            .update_bank_details(
                BankDetailsUpdate {
                    ifsc_code: Some(Some("SBIN0000001".into())),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(merged.bank_name, created.bank_name);
        assert_eq!(merged.qr_code_url, created.qr_code_url);
        assert_eq!(storage.bank_details().unwrap(), Some(merged));
    }

    fn news(title: &str) -> News {
        NewsDraft {
            title: title.into(),
            description: String::new(),
            image_url: None,
            visible: None,
        }
        .into_news(Utc::now())
    }

    #[test]
    fn test_update_racing_delete_never_restores_post() {
        let storage = Storage::temporary().unwrap();
        for _ in 0..50 {
            let post = news("Racing");
            let id = post.id;
            storage.insert_news(&post).unwrap();

            let writers: Vec<_> = (0..4)
                .map(|_| {
                    let storage = storage.clone();
                    std::thread::spawn(move || {
                        for _ in 0..20 {
                            let update = NewsUpdate {
                                visible: Some(false),
                                ..Default::default()
                            };
                            storage.update_news(id, update).unwrap();
                        }
                    })
                })
                .collect();
            assert!(storage.delete_news(id).unwrap());
            for writer in writers {
                writer.join().unwrap();
            }

            assert!(storage.news.get(id.as_bytes()).unwrap().is_none());
        }
    }

    #[test]
    fn test_concurrent_bank_updates_are_not_lost() {
        let storage = Storage::temporary().unwrap();
        let writers: Vec<_> = (0..8)
            .map(|i| {
                let storage = storage.clone();
                std::thread::spawn(move || {
                    let mut update = BankDetailsUpdate::default();
                    let value = Some(Some(format!("value-{i}")));
                    match i % 4 {
                        0 => update.account_name = value,
                        1 => update.bank_name = value,
                        2 => update.branch_name = value,
                        _ => update.upi_id = value,
                    }
                    storage.update_bank_details(update, Utc::now()).unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let bank = storage.bank_details().unwrap().unwrap();
        assert!(bank.account_name.is_some());
        assert!(bank.bank_name.is_some());
        assert!(bank.branch_name.is_some());
        assert!(bank.upi_id.is_some());
    }
}
