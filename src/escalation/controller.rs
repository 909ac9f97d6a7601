use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Envelope, EscalationError};
use crate::agent::{self, prompt, AgentReply, AgentSpec, ModelSettings, ReplyCategory, TicketDraft};
use crate::providers::Provider;
use crate::sessions::{mint_session_id, Session, SessionStore, Turn};

/// Per-session async locks, held across the generation call.
///
/// An entry lives only while some request holds or waits on it.
#[derive(Default)]
struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: &str) -> SessionLease<'_> {
        let handle = self
            .inner
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .clone();
        let guard = handle.lock_owned().await;
        SessionLease {
            locks: self,
            session_id: session_id.to_string(),
            guard: Some(guard),
        }
    }

    fn release(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        if inner
            .get(session_id)
            .is_some_and(|handle| Arc::strong_count(handle) == 1)
        {
            inner.remove(session_id);
        }
    }
}

/// Exclusive hold on one session; evicts the table entry on drop when unused.
struct SessionLease<'a> {
    locks: &'a SessionLocks,
    session_id: String,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for SessionLease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.session_id);
    }
}

/// Drives the escalation protocol: counts resolution attempts per session and
/// hands the conversation to the drafting agent once the budget is spent.
pub struct EscalationController {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn Provider>,
    settings: ModelSettings,
    max_attempts: u32,
    resolution: AgentSpec,
    drafting: AgentSpec,
    locks: SessionLocks,
}

impl EscalationController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn Provider>,
        settings: ModelSettings,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            provider,
            settings,
            max_attempts,
            resolution: AgentSpec::resolution(),
            drafting: AgentSpec::drafting(),
            locks: SessionLocks::default(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Handle one inbound message and shape the response envelope.
    ///
    /// A missing or blank `session_id` starts a new session; an id that is
    /// not in the store is rejected. The user turn and any attempt increment
    /// are committed before the generation call, the system turn only after
    /// it succeeds.
    pub async fn handle_message(
        &self,
        session_id: Option<&str>,
        description: &str,
    ) -> Result<Envelope, EscalationError> {
        let session_id = match session_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                if self.store.get(id).await?.is_none() {
                    return Err(EscalationError::SessionNotFound(id.to_string()));
                }
                id.to_string()
            }
            None => {
                let session = self.store.create(Session::new(mint_session_id())).await?;
                tracing::info!(session_id = %session.session_id, "escalation session created");
                session.session_id
            }
        };

        let _lease = self.locks.acquire(&session_id).await;

        // Reload under the lock; a concurrent request may have advanced it.
        let mut session = self
            .store
            .get(&session_id)
            .await?
            .ok_or_else(|| EscalationError::SessionNotFound(session_id.clone()))?;

        let already_escalated = session.escalated;
        session.conversation_history.push(Turn::user(description));
        if session.new_attempt && !already_escalated {
            session.attempt_count += 1;
            tracing::info!(
                session_id = %session_id,
                attempt = session.attempt_count,
                max_attempts = self.max_attempts,
                "resolution attempt started"
            );
        }
        self.store.update(&session).await?;

        if already_escalated || session.attempt_count > self.max_attempts {
            self.draft_ticket(session).await
        } else {
            self.attempt_resolution(session).await
        }
    }

    async fn attempt_resolution(&self, mut session: Session) -> Result<Envelope, EscalationError> {
        let user_prompt = prompt::resolution_prompt(&session.conversation_history);
        let reply: AgentReply = agent::run_agent(
            self.provider.as_ref(),
            &self.resolution,
            &self.settings,
            &user_prompt,
        )
        .await
        .map_err(|e| {
            tracing::warn!(session_id = %session.session_id, agent = self.resolution.name, "{e}");
            EscalationError::from(e)
        })?;

        session
            .conversation_history
            .push(Turn::system(reply.content.clone()));
        // A question keeps the attempt open; a solution closes it, so the
        // user's next message counts as a fresh attempt.
        session.new_attempt = reply.category == ReplyCategory::Solution;
        self.store.update(&session).await?;

        tracing::info!(
            session_id = %session.session_id,
            attempt = session.attempt_count,
            category = reply.category.as_str(),
            "resolution agent replied"
        );

        Ok(Envelope::reply(session.session_id, reply))
    }

    async fn draft_ticket(&self, mut session: Session) -> Result<Envelope, EscalationError> {
        let user_prompt = prompt::drafting_prompt(&session.conversation_history);
        let draft: TicketDraft = agent::run_agent(
            self.provider.as_ref(),
            &self.drafting,
            &self.settings,
            &user_prompt,
        )
        .await
        .map_err(|e| {
            tracing::warn!(session_id = %session.session_id, agent = self.drafting.name, "{e}");
            EscalationError::from(e)
        })?;

        if !session.escalated {
            session.escalated = true;
            self.store.update(&session).await?;
            tracing::info!(
                session_id = %session.session_id,
                attempts = session.attempt_count,
                "session escalated to ticket draft"
            );
        }

        Ok(Envelope::ticket_draft(session.session_id, draft))
    }

    /// Current stored state of a session.
    pub async fn session(&self, session_id: &str) -> Result<Session, EscalationError> {
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| EscalationError::SessionNotFound(session_id.to_string()))
    }

    /// Drop a session.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), EscalationError> {
        let _lease = self.locks.acquire(session_id).await;
        let removed = self.store.delete(session_id).await?;
        if removed {
            tracing::info!(session_id, "escalation session deleted");
            Ok(())
        } else {
            Err(EscalationError::SessionNotFound(session_id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::testing::ScriptedProvider;
    use crate::escalation::EnvelopeBody;
    use crate::sessions::{InMemorySessionStore, Role, SessionState};
    use std::time::Duration;

    fn controller(provider: Arc<ScriptedProvider>) -> EscalationController {
        EscalationController::new(
            Arc::new(InMemorySessionStore::new()),
            provider,
            ModelSettings {
                model: "test-model".into(),
                temperature: 0.0,
            },
            2,
        )
    }

    fn content(envelope: &Envelope) -> &str {
        match &envelope.body {
            EnvelopeBody::Question(c) | EnvelopeBody::Solution(c) => c.as_str(),
            EnvelopeBody::TicketDraft(_) => panic!("expected a reply, got a ticket draft"),
        }
    }

    #[tokio::test]
    async fn full_escalation_walkthrough() {
        let provider = Arc::new(ScriptedProvider::new());
        let ctl = controller(provider.clone());

        // A: new session, clarifying question.
        provider.question("what error do you see?");
        let a = ctl.handle_message(None, "my app crashes").await.unwrap();
        assert_eq!(a.category(), "question");
        assert_eq!(content(&a), "what error do you see?");
        let id = a.session_id.clone();
        let s = ctl.session(&id).await.unwrap();
        assert_eq!(s.attempt_count, 1);
        assert!(!s.new_attempt);
        assert_eq!(s.state(), SessionState::AttemptInProgress);

        // B: follow-up stays within attempt 1.
        provider.solution("restart the service");
        let b = ctl.handle_message(Some(&id), "I see error 500").await.unwrap();
        assert_eq!(b.category(), "solution");
        let s = ctl.session(&id).await.unwrap();
        assert_eq!(s.attempt_count, 1);
        assert!(s.new_attempt);

        // C: solution failed, attempt 2.
        provider.solution("clear the cache");
        let c = ctl.handle_message(Some(&id), "still broken").await.unwrap();
        assert_eq!(c.category(), "solution");
        let s = ctl.session(&id).await.unwrap();
        assert_eq!(s.attempt_count, 2);
        assert_eq!(s.conversation_history.len(), 6);

        // Attempt 3 exceeds the budget and drafts a ticket.
        provider.draft("App crashes with error 500", "Restart and cache clear tried.");
        let d = ctl.handle_message(Some(&id), "nope").await.unwrap();
        match &d.body {
            EnvelopeBody::TicketDraft(draft) => {
                assert_eq!(draft.title, "App crashes with error 500");
                assert_eq!(draft.description, "Restart and cache clear tried.");
            }
            other => panic!("expected ticket draft, got {other:?}"),
        }

        assert_eq!(
            provider.schemas(),
            ["agent_reply", "agent_reply", "agent_reply", "ticket_draft"]
        );
        let draft_prompt = provider.last_prompt().unwrap();
        for turn in [
            "my app crashes",
            "what error do you see?",
            "I see error 500",
            "restart the service",
            "still broken",
            "clear the cache",
            "nope",
        ] {
            assert!(draft_prompt.contains(turn), "draft prompt missing {turn:?}");
        }

        let s = ctl.session(&id).await.unwrap();
        assert_eq!(s.attempt_count, 3);
        assert_eq!(s.state(), SessionState::Escalated);
        // The drafting path appends no system turn.
        assert_eq!(s.conversation_history.len(), 7);
        assert_eq!(s.conversation_history[6], Turn::user("nope"));
    }

    #[tokio::test]
    async fn questions_never_consume_attempts() {
        let provider = Arc::new(ScriptedProvider::new());
        let ctl = controller(provider.clone());

        provider.question("which browser?");
        let id = ctl.handle_message(None, "page is blank").await.unwrap().session_id;
        for answer in ["firefox", "version 120", "on linux", "yes, cleared"] {
            provider.question("anything else?");
            let env = ctl.handle_message(Some(&id), answer).await.unwrap();
            assert_eq!(env.category(), "question");
        }

        let s = ctl.session(&id).await.unwrap();
        assert_eq!(s.attempt_count, 1);
        assert_eq!(s.conversation_history.len(), 10);
    }

    #[tokio::test]
    async fn third_attempt_drafts_without_calling_resolution() {
        let provider = Arc::new(ScriptedProvider::new());
        let ctl = controller(provider.clone());

        provider.solution("try a");
        let id = ctl.handle_message(None, "broken").await.unwrap().session_id;
        provider.solution("try b");
        ctl.handle_message(Some(&id), "a failed").await.unwrap();
        provider.draft("Broken", "Tried a and b.");
        let env = ctl.handle_message(Some(&id), "b failed").await.unwrap();

        assert_eq!(env.category(), "ticket_draft");
        assert_eq!(provider.schemas().last().unwrap(), "ticket_draft");
    }

    #[tokio::test]
    async fn escalated_session_only_redrafts() {
        let provider = Arc::new(ScriptedProvider::new());
        let ctl = EscalationController::new(
            Arc::new(InMemorySessionStore::new()),
            provider.clone(),
            ModelSettings {
                model: "m".into(),
                temperature: 0.0,
            },
            1,
        );

        provider.solution("reboot");
        let id = ctl.handle_message(None, "wifi drops").await.unwrap().session_id;
        provider.draft("Wifi drops", "Reboot tried.");
        assert_eq!(
            ctl.handle_message(Some(&id), "still drops").await.unwrap().category(),
            "ticket_draft"
        );

        provider.draft("Wifi drops hourly", "Reboot tried; drops hourly.");
        let again = ctl.handle_message(Some(&id), "it drops hourly").await.unwrap();
        assert_eq!(again.category(), "ticket_draft");

        let s = ctl.session(&id).await.unwrap();
        assert_eq!(s.attempt_count, 2);
        assert_eq!(s.conversation_history.len(), 4);
        assert_eq!(
            provider.schemas(),
            ["agent_reply", "ticket_draft", "ticket_draft"]
        );
    }

    #[tokio::test]
    async fn generation_failure_keeps_user_turn_only() {
        let provider = Arc::new(ScriptedProvider::new());
        let ctl = controller(provider.clone());

        provider.question("what error?");
        let id = ctl.handle_message(None, "crash").await.unwrap().session_id;

        provider.push_err("request timed out");
        let err = ctl.handle_message(Some(&id), "error 500").await.unwrap_err();
        assert!(matches!(err, EscalationError::GenerationFailure(_)), "got {err:?}");

        let s = ctl.session(&id).await.unwrap();
        assert_eq!(s.conversation_history.len(), 3);
        assert_eq!(s.conversation_history[2], Turn::user("error 500"));
        assert_eq!(s.attempt_count, 1);
        assert!(!s.new_attempt);
    }

    #[tokio::test]
    async fn out_of_set_category_fails_closed() {
        let provider = Arc::new(ScriptedProvider::new());
        let ctl = controller(provider.clone());

        provider.push_ok(r#"{"category":"escalate","content":"calling a human"}"#);
        let err = ctl.handle_message(None, "help").await.unwrap_err();
        assert!(matches!(err, EscalationError::MalformedAgentOutput(_)), "got {err:?}");

        let sessions = ctl
            .store()
            .list(&crate::sessions::SessionFilter::default())
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].conversation_history, vec![Turn::user("help")]);
        assert!(sessions[0].new_attempt);
    }

    #[tokio::test]
    async fn draft_failure_does_not_escalate() {
        let provider = Arc::new(ScriptedProvider::new());
        let ctl = controller(provider.clone());

        provider.solution("a");
        let id = ctl.handle_message(None, "x").await.unwrap().session_id;
        provider.solution("b");
        ctl.handle_message(Some(&id), "y").await.unwrap();
        provider.push_ok(r#"{"title":"missing description"}"#);
        let err = ctl.handle_message(Some(&id), "z").await.unwrap_err();
        assert!(matches!(err, EscalationError::MalformedAgentOutput(_)));

        let s = ctl.session(&id).await.unwrap();
        assert!(!s.escalated);
        assert_eq!(s.attempt_count, 3);
    }

    #[tokio::test]
    async fn unknown_session_id_is_rejected() {
        let provider = Arc::new(ScriptedProvider::new());
        let ctl = controller(provider.clone());

        let err = ctl.handle_message(Some("nope"), "hello").await.unwrap_err();
        assert!(matches!(err, EscalationError::SessionNotFound(ref id) if id == "nope"));
        assert!(provider.schemas().is_empty());
        assert!(ctl
            .store()
            .list(&crate::sessions::SessionFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn blank_session_id_and_empty_description_start_a_session() {
        let provider = Arc::new(ScriptedProvider::new());
        let ctl = controller(provider.clone());

        provider.question("how can I help?");
        let env = ctl.handle_message(Some("  "), "").await.unwrap();
        assert_eq!(env.session_id.len(), 32);

        let s = ctl.session(&env.session_id).await.unwrap();
        assert_eq!(s.conversation_history[0].role, Role::User);
        assert_eq!(s.conversation_history[0].content, "");
        assert_eq!(s.attempt_count, 1);
    }

    #[tokio::test]
    async fn history_is_prefix_stable() {
        let provider = Arc::new(ScriptedProvider::new());
        let ctl = EscalationController::new(
            Arc::new(InMemorySessionStore::new()),
            provider.clone(),
            ModelSettings {
                model: "m".into(),
                temperature: 0.0,
            },
            10,
        );

        provider.question("q0");
        let id = ctl.handle_message(None, "m0").await.unwrap().session_id;
        let mut previous = ctl.session(&id).await.unwrap().conversation_history;
        let mut previous_count = 1;

        for i in 1..6 {
            if i % 2 == 0 {
                provider.question(&format!("q{i}"));
            } else {
                provider.solution(&format!("s{i}"));
            }
            let before = ctl.session(&id).await.unwrap();
            ctl.handle_message(Some(&id), &format!("m{i}")).await.unwrap();
            let after = ctl.session(&id).await.unwrap();

            assert_eq!(after.conversation_history.len(), previous.len() + 2);
            assert_eq!(&after.conversation_history[..previous.len()], &previous[..]);
            let expected = previous_count + u32::from(before.new_attempt);
            assert_eq!(after.attempt_count, expected);
            assert!(after.attempt_count >= previous_count);

            previous = after.conversation_history;
            previous_count = after.attempt_count;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_messages_on_one_session_do_not_lose_updates() {
        let provider = Arc::new(ScriptedProvider::with_delay(Duration::from_millis(20)));
        let ctl = Arc::new(EscalationController::new(
            Arc::new(InMemorySessionStore::new()),
            provider.clone(),
            ModelSettings {
                model: "m".into(),
                temperature: 0.0,
            },
            100,
        ));

        provider.solution("first");
        let id = ctl.handle_message(None, "start").await.unwrap().session_id;

        let rounds = 8;
        for i in 0..rounds {
            provider.solution(&format!("solution {i}"));
        }

        let handles: Vec<_> = (0..rounds)
            .map(|i| {
                let ctl = Arc::clone(&ctl);
                let id = id.clone();
                tokio::spawn(async move { ctl.handle_message(Some(&id), &format!("msg {i}")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let s = ctl.session(&id).await.unwrap();
        assert_eq!(s.attempt_count, 1 + rounds);
        assert_eq!(s.conversation_history.len(), 2 + 2 * rounds as usize);
        // Turns arrive in user/system pairs, never interleaved.
        for pair in s.conversation_history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::System);
        }
        assert!(ctl.locks.inner.lock().is_empty());
    }

    #[tokio::test]
    async fn lock_entries_are_evicted_once_released() {
        let provider = Arc::new(ScriptedProvider::new());
        let ctl = controller(provider.clone());

        provider.question("which device?").question("which version?");
        let a = ctl.handle_message(None, "printer offline").await.unwrap().session_id;
        let b = ctl.handle_message(None, "vpn drops").await.unwrap().session_id;
        assert_ne!(a, b);
        assert!(ctl.locks.inner.lock().is_empty());

        provider.push_err("upstream timed out");
        ctl.handle_message(Some(&a), "laser").await.unwrap_err();
        assert!(ctl.locks.inner.lock().is_empty());
    }

    #[tokio::test]
    async fn lock_entry_survives_while_another_request_waits() {
        let locks = SessionLocks::default();

        let first = locks.acquire("s1").await;
        let waiter = locks.inner.lock().get("s1").cloned().unwrap();
        drop(first);
        assert_eq!(locks.inner.lock().len(), 1);

        drop(waiter);
        let again = locks.acquire("s1").await;
        drop(again);
        assert!(locks.inner.lock().is_empty());
    }

    #[tokio::test]
    async fn draft_generation_failure_does_not_escalate() {
        let provider = Arc::new(ScriptedProvider::new());
        let ctl = controller(provider.clone());

        provider.solution("a");
        let id = ctl.handle_message(None, "x").await.unwrap().session_id;
        provider.solution("b");
        ctl.handle_message(Some(&id), "y").await.unwrap();
        provider.push_err("request timed out");
        let err = ctl.handle_message(Some(&id), "z").await.unwrap_err();
        assert!(matches!(err, EscalationError::GenerationFailure(ref m) if m.contains("timed out")));
        assert_eq!(provider.schemas().last().map(String::as_str), Some("ticket_draft"));

        let s = ctl.session(&id).await.unwrap();
        assert!(!s.escalated);
        assert_eq!(s.state(), SessionState::AttemptBoundary);
        assert_eq!(s.attempt_count, 3);
        assert_eq!(s.conversation_history.len(), 5);
        assert_eq!(s.conversation_history[4], Turn::user("z"));

        // A resend drafts again; the counter keeps moving past the budget.
        provider.draft("Broken", "Tried a and b.");
        let envelope = ctl.handle_message(Some(&id), "z").await.unwrap();
        assert_eq!(envelope.category(), "ticket_draft");
        let s = ctl.session(&id).await.unwrap();
        assert!(s.escalated);
        assert_eq!(s.attempt_count, 4);
    }

    #[tokio::test]
    async fn delete_session_removes_it() {
        let provider = Arc::new(ScriptedProvider::new());
        let ctl = controller(provider.clone());

        provider.question("?");
        let id = ctl.handle_message(None, "hi").await.unwrap().session_id;
        ctl.delete_session(&id).await.unwrap();

        assert!(matches!(
            ctl.session(&id).await,
            Err(EscalationError::SessionNotFound(_))
        ));
        assert!(matches!(
            ctl.delete_session(&id).await,
            Err(EscalationError::SessionNotFound(_))
        ));
    }
}
