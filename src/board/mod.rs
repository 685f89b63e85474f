//! The advice flow: put a question to a user's board and keep the answers.
//!
//! `convene` asks every member in turn, one model call each, and only writes
//! history once every member has answered. A failed call aborts the whole
//! request. `chain` asks one member to weigh in on another member's stored
//! answer and links the new record back to it.

use boardroom_common::{ChainLink, History, HistoryQuery, Member, NewHistory, ValidationError};

use crate::errors::BoardError;
use crate::llm::SharedProvider;
use crate::store::SharedStore;

pub mod prompt;

#[derive(Clone)]
pub struct Boardroom {
    store: SharedStore,
    model: SharedProvider,
}

impl Boardroom {
    pub fn new(store: SharedStore, model: SharedProvider) -> Self {
        Self { store, model }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Ask every member of the user's board, in order, and persist the answers.
    pub async fn convene(&self, user_id: &str, user_input: &str) -> Result<Vec<History>, BoardError> {
        require("user_id", user_id)?;
        require("user_input", user_input)?;

        let members = self.store.list_members(user_id).await?;
        tracing::info!(user_id, members = members.len(), "Convening board");

        let mut answers = Vec::with_capacity(members.len());
        for member in &members {
            let output = self
                .answer(member, &prompt::advice_prompt(member, user_input))
                .await?;
            answers.push(NewHistory {
                user_id: user_id.to_string(),
                member_id: member.id.clone(),
                user_input: user_input.to_string(),
                member_output: output,
                chat: None,
            });
        }

        let mut saved = Vec::with_capacity(answers.len());
        for entry in answers {
            saved.push(self.store.insert_history(entry).await?);
        }
        tracing::info!(user_id, saved = saved.len(), "Board answers saved");
        Ok(saved)
    }

    /// Ask a single member of the user's board.
    pub async fn ask_member(
        &self,
        user_id: &str,
        member_id: &str,
        user_input: &str,
    ) -> Result<History, BoardError> {
        require("user_id", user_id)?;
        require("user_input", user_input)?;

        let member = self.owned_member(user_id, member_id).await?;
        let output = self
            .answer(&member, &prompt::advice_prompt(&member, user_input))
            .await?;
        let saved = self
            .store
            .insert_history(NewHistory {
                user_id: user_id.to_string(),
                member_id: member.id.clone(),
                user_input: user_input.to_string(),
                member_output: output,
                chat: None,
            })
            .await?;
        Ok(saved)
    }

    /// Ask `member_id` what they think of the answer stored as `history_id`.
    pub async fn chain(
        &self,
        user_id: &str,
        history_id: &str,
        member_id: &str,
    ) -> Result<History, BoardError> {
        require("user_id", user_id)?;

        let source = self
            .store
            .get_history(history_id)
            .await?
            .filter(|h| h.user_id == user_id)
            .ok_or_else(|| BoardError::HistoryNotFound {
                id: history_id.to_string(),
            })?;
        let member = self.owned_member(user_id, member_id).await?;

        let author = self.store.get_member(&source.member_id).await?;
        let author_name = author
            .as_ref()
            .map(|a| a.name.as_str())
            .unwrap_or(prompt::UNKNOWN_AUTHOR);

        let prompt = prompt::critique_prompt(
            &member,
            author_name,
            &source.user_input,
            &source.member_output,
        );
        let output = self.answer(&member, &prompt).await?;

        tracing::info!(
            user_id,
            in_reply_to = %source.id,
            member_id = %member.id,
            "Chained answer generated"
        );

        let saved = self
            .store
            .insert_history(NewHistory {
                user_id: user_id.to_string(),
                member_id: member.id.clone(),
                user_input: source.user_input.clone(),
                member_output: output,
                chat: Some(ChainLink {
                    in_reply_to: source.id.clone(),
                    source_member_id: source.member_id.clone(),
                }),
            })
            .await?;
        Ok(saved)
    }

    pub async fn history(&self, query: &HistoryQuery) -> Result<Vec<History>, BoardError> {
        require("user_id", &query.user_id)?;
        Ok(self.store.list_history(query).await?)
    }

    async fn answer(&self, member: &Member, prompt: &str) -> Result<String, BoardError> {
        self.model.generate(prompt).await.map_err(|source| {
            tracing::error!(
                member_id = %member.id,
                provider = self.model.name(),
                error = %source,
                "Model call failed"
            );
            BoardError::Generation {
                member_id: member.id.clone(),
                source,
            }
        })
    }

    /// A member that exists and belongs to `user_id`. Foreign members are
    /// reported as missing.
    async fn owned_member(&self, user_id: &str, member_id: &str) -> Result<Member, BoardError> {
        self.store
            .get_member(member_id)
            .await?
            .filter(|m| m.user_id == user_id)
            .ok_or_else(|| BoardError::MemberNotFound {
                id: member_id.to_string(),
            })
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Blank { field })
    } else {
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use boardroom_common::{MemberPatch, NewMember, Picture};

    use super::testing::ScriptedProvider;
    use super::*;
    use crate::errors::StoreError;
    use crate::store::{SqliteStore, Store};

    /// SQLite store that can hide one member from lookups and fail the Nth
    /// history insert.
    struct FlakyStore {
        inner: SqliteStore,
        hidden_member: Mutex<Option<String>>,
        fail_insert_on: Option<usize>,
        inserts: AtomicUsize,
    }

    impl FlakyStore {
        fn new(fail_insert_on: Option<usize>) -> Self {
            Self {
                inner: SqliteStore::in_memory().unwrap(),
                hidden_member: Mutex::new(None),
                fail_insert_on,
                inserts: AtomicUsize::new(0),
            }
        }

        fn hide_member(&self, id: &str) {
            *self.hidden_member.lock().unwrap() = Some(id.to_string());
        }

        fn inserts(&self) -> usize {
            self.inserts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Store for FlakyStore {
        fn backend(&self) -> &'static str {
            "flaky"
        }

        async fn list_members(&self, user_id: &str) -> Result<Vec<Member>, StoreError> {
            self.inner.list_members(user_id).await
        }

        async fn get_member(&self, id: &str) -> Result<Option<Member>, StoreError> {
            let hidden = self.hidden_member.lock().unwrap().as_deref() == Some(id);
            if hidden {
                return Ok(None);
            }
            self.inner.get_member(id).await
        }

        async fn create_member(&self, member: NewMember) -> Result<Member, StoreError> {
            self.inner.create_member(member).await
        }

        async fn update_member(
            &self,
            id: &str,
            patch: MemberPatch,
        ) -> Result<Option<Member>, StoreError> {
            self.inner.update_member(id, patch).await
        }

        async fn delete_member(&self, id: &str) -> Result<bool, StoreError> {
            self.inner.delete_member(id).await
        }

        async fn insert_history(&self, entry: NewHistory) -> Result<History, StoreError> {
            let call = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_insert_on == Some(call) {
                return Err(StoreError::Upstream {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            self.inner.insert_history(entry).await
        }

        async fn get_history(&self, id: &str) -> Result<Option<History>, StoreError> {
            self.inner.get_history(id).await
        }

        async fn list_history(&self, query: &HistoryQuery) -> Result<Vec<History>, StoreError> {
            self.inner.list_history(query).await
        }

        async fn list_pictures(&self) -> Result<Vec<Picture>, StoreError> {
            self.inner.list_pictures().await
        }
    }

    async fn seed(store: &dyn Store) -> Vec<Member> {
        let mut members = Vec::new();
        for (name, description) in [
            ("Marcus Steele", "veteran CEO"),
            ("Priya Desai", "lawyer"),
            ("Victor Kwan", "economist"),
        ] {
            members.push(
                store
                    .create_member(NewMember {
                        user_id: "u1".into(),
                        name: name.into(),
                        description: description.into(),
                        background: format!("{} background", name),
                        role: vec![],
                        picture: String::new(),
                    })
                    .await
                    .unwrap(),
            );
        }
        members
    }

    async fn seeded(provider: Arc<ScriptedProvider>) -> (Boardroom, Vec<Member>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let members = seed(store.as_ref()).await;
        (Boardroom::new(store, provider), members)
    }

    #[tokio::test]
    async fn test_convene_asks_every_member_in_order() {
        let provider = Arc::new(ScriptedProvider::default());
        let (board, members) = seeded(provider.clone()).await;

        let saved = board.convene("u1", "Should we expand to Europe?").await.unwrap();
        assert_eq!(saved.len(), 3);
        for (record, member) in saved.iter().zip(&members) {
            assert_eq!(record.member_id, member.id);
            assert_eq!(record.user_input, "Should we expand to Europe?");
            assert!(record.chat.is_none());
        }
        assert_eq!(saved[0].member_output, "answer #1");
        assert_eq!(saved[2].member_output, "answer #3");

        let prompts = provider.prompts();
        assert!(prompts[0].starts_with("You are a veteran CEO."));
        assert!(prompts[1].starts_with("You are a lawyer."));
        assert!(prompts[2].ends_with("Should we expand to Europe?"));

        let stored = board.history(&HistoryQuery::for_user("u1")).await.unwrap();
        assert_eq!(stored, saved);
    }

    #[tokio::test]
    async fn test_convene_failure_persists_nothing() {
        let provider = Arc::new(ScriptedProvider::failing_on(2));
        let (board, members) = seeded(provider.clone()).await;

        let err = board.convene("u1", "Pivot?").await.unwrap_err();
        match err {
            BoardError::Generation { member_id, .. } => assert_eq!(member_id, members[1].id),
            other => panic!("Expected Generation error, got {other:?}"),
        }
        // The third member is never asked once the second fails.
        assert_eq!(provider.prompts().len(), 2);
        assert!(board.history(&HistoryQuery::for_user("u1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_convene_stops_at_first_failed_insert() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = Arc::new(FlakyStore::new(Some(2)));
        let members = seed(store.as_ref()).await;
        let board = Boardroom::new(store.clone(), provider.clone());

        let err = board.convene("u1", "Raise a round?").await.unwrap_err();
        assert!(matches!(
            err,
            BoardError::Store(StoreError::Upstream { status: 503, .. })
        ));
        // Every member answered before the writes began.
        assert_eq!(provider.prompts().len(), 3);
        assert_eq!(store.inserts(), 2);

        let stored = board.history(&HistoryQuery::for_user("u1")).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].member_id, members[0].id);
    }

    #[tokio::test]
    async fn test_convene_without_members_is_empty() {
        let provider = Arc::new(ScriptedProvider::default());
        let (board, _) = seeded(provider.clone()).await;
        let saved = board.convene("nobody", "Hello?").await.unwrap();
        assert!(saved.is_empty());
        assert!(provider.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_convene_rejects_blank_input() {
        let provider = Arc::new(ScriptedProvider::default());
        let (board, _) = seeded(provider.clone()).await;
        let err = board.convene("u1", "   ").await.unwrap_err();
        assert!(matches!(
            err,
            BoardError::Invalid(ValidationError::Blank { field: "user_input" })
        ));
        assert!(provider.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_ask_member_persists_one_answer() {
        let provider = Arc::new(ScriptedProvider::default());
        let (board, members) = seeded(provider.clone()).await;

        let saved = board
            .ask_member("u1", &members[1].id, "Is this contract enforceable?")
            .await
            .unwrap();
        assert_eq!(saved.member_id, members[1].id);
        assert_eq!(saved.member_output, "answer #1");
        assert_eq!(provider.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_ask_member_of_another_user_is_not_found() {
        let provider = Arc::new(ScriptedProvider::default());
        let (board, members) = seeded(provider.clone()).await;
        let err = board
            .ask_member("intruder", &members[0].id, "Tell me secrets")
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::MemberNotFound { .. }));
        assert!(provider.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_chain_links_to_source_answer() {
        let provider = Arc::new(ScriptedProvider::default());
        let (board, members) = seeded(provider.clone()).await;
        let first = board
            .ask_member("u1", &members[0].id, "Should I fire my cofounder?")
            .await
            .unwrap();

        let reply = board.chain("u1", &first.id, &members[2].id).await.unwrap();
        assert_eq!(reply.member_id, members[2].id);
        assert_eq!(reply.user_input, "Should I fire my cofounder?");
        assert_eq!(
            reply.chat,
            Some(ChainLink {
                in_reply_to: first.id.clone(),
                source_member_id: members[0].id.clone(),
            })
        );

        let prompts = provider.prompts();
        let critique = &prompts[1];
        assert!(critique.starts_with("You are a economist."));
        assert!(critique.contains("Marcus Steele"));
        assert!(critique.contains("answer #1"));
    }

    #[tokio::test]
    async fn test_chain_names_missing_author_generically() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = Arc::new(FlakyStore::new(None));
        let members = seed(store.as_ref()).await;
        let board = Boardroom::new(store.clone(), provider.clone());
        let first = board
            .ask_member("u1", &members[0].id, "Should I sell the company?")
            .await
            .unwrap();

        store.hide_member(&members[0].id);
        let reply = board.chain("u1", &first.id, &members[1].id).await.unwrap();
        assert_eq!(
            reply.chat,
            Some(ChainLink {
                in_reply_to: first.id.clone(),
                source_member_id: members[0].id.clone(),
            })
        );

        let critique = &provider.prompts()[1];
        assert!(critique.contains(prompt::UNKNOWN_AUTHOR));
        assert!(!critique.contains("Marcus Steele"));
        assert!(critique.contains("answer #1"));
    }

    #[tokio::test]
    async fn test_chain_on_foreign_history_is_not_found() {
        let provider = Arc::new(ScriptedProvider::default());
        let (board, members) = seeded(provider.clone()).await;
        let first = board
            .ask_member("u1", &members[0].id, "Question")
            .await
            .unwrap();

        let err = board
            .chain("someone-else", &first.id, &members[1].id)
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::HistoryNotFound { .. }));

        let err = board.chain("u1", "missing", &members[1].id).await.unwrap_err();
        assert!(matches!(err, BoardError::HistoryNotFound { .. }));
    }

    #[tokio::test]
    async fn test_chain_to_unknown_member_is_not_found() {
        let provider = Arc::new(ScriptedProvider::default());
        let (board, members) = seeded(provider.clone()).await;
        let first = board
            .ask_member("u1", &members[0].id, "Question")
            .await
            .unwrap();
        let err = board.chain("u1", &first.id, "ghost").await.unwrap_err();
        assert!(matches!(err, BoardError::MemberNotFound { id } if id == "ghost"));
    }
}
