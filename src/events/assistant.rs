//! Request pipeline.
//!
//! Every non-command request passes the rate limiter first. Quota-consuming
//! requests then go through [`QuotaGate::run`], so a provider failure never
//! costs the user anything. Nothing here touches Telegram.

use std::future::Future;
use std::sync::Arc;

use chrono::{FixedOffset, Utc};
use tracing::{debug, error, warn};

use super::{Intent, Reply, classify};
use crate::ai::{AiProvider, ChatMessage, Persona};
use crate::database::{HistoryStore, MessageKind, NewReminder, ReminderStore, Role, UserStore};
use crate::error::BotError;
use crate::i18n::{self, t};
use crate::limits::{PlanTable, QuotaGate, RateLimiter, UsageKind};
use crate::utils::calc::{self, CalcError};
use crate::utils::reminder_parser::{self, ParseErrorKind};
use crate::utils::{html_escape, truncate_chars};

/// Longest answer read out by text-to-speech.
pub const MAX_SPEECH_CHARS: usize = 500;

/// Who is asking, resolved once per update.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: u64,
    pub chat_id: i64,
    pub lang: &'static str,
    pub persona: Persona,
}

/// Tunables of the pipeline.
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub max_history: usize,
    pub timezone: FixedOffset,
    pub tts_voice: String,
}

/// Telegram-independent core of the bot.
#[derive(Clone)]
pub struct Assistant {
    ai: Arc<dyn AiProvider>,
    users: Arc<dyn UserStore>,
    reminders: Arc<dyn ReminderStore>,
    history: Arc<dyn HistoryStore>,
    limiter: RateLimiter,
    gate: QuotaGate,
    settings: AssistantSettings,
}

impl Assistant {
    pub fn new(
        ai: Arc<dyn AiProvider>,
        users: Arc<dyn UserStore>,
        reminders: Arc<dyn ReminderStore>,
        history: Arc<dyn HistoryStore>,
        limiter: RateLimiter,
        plans: PlanTable,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            gate: QuotaGate::new(users.clone(), plans),
            ai,
            users,
            reminders,
            history,
            limiter,
            settings,
        }
    }

    pub fn gate(&self) -> &QuotaGate {
        &self.gate
    }

    pub fn timezone(&self) -> FixedOffset {
        self.settings.timezone
    }

    /// Load persona and language for a user. Store errors fall back to defaults.
    pub async fn caller(&self, user_id: u64, chat_id: i64, telegram_lang: Option<&str>) -> Caller {
        let profile = match self.users.get(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Failed to load profile {}: {}", user_id, e);
                None
            }
        };

        let stored_lang = profile.as_ref().and_then(|p| p.language.as_deref());
        Caller {
            user_id,
            chat_id,
            lang: i18n::resolve_locale(stored_lang, telegram_lang),
            persona: profile
                .as_ref()
                .map(|p| Persona::from_key_lossy(&p.persona))
                .unwrap_or_default(),
        }
    }

    /// Handle a plain text message.
    pub async fn handle_text(&self, who: &Caller, text: &str) -> Reply {
        let result = match self.admit(who) {
            Ok(()) => match classify(text) {
                Intent::Reminder(text) => self.create_reminder(who, &text).await,
                Intent::Calc(expr) => self.calculate(who, &expr),
                Intent::GenerateImage(prompt) => self.generate_image(who, &prompt).await,
                Intent::Chat(text) => self.chat(who, &text).await,
            },
            Err(e) => Err(e),
        };
        self.finish(who, result)
    }

    /// Handle a photo with an optional caption as the question.
    ///
    /// `fetch` downloads the image and is only awaited after the limiter
    /// and the image quota have let the request through.
    pub async fn handle_photo<F, Fut>(&self, who: &Caller, caption: Option<&str>, fetch: F) -> Reply
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, BotError>>,
    {
        let result = match self.admit(who) {
            Ok(()) => self.describe_image(who, caption, fetch).await,
            Err(e) => Err(e),
        };
        self.finish(who, result)
    }

    /// Handle a voice note of `duration_secs` seconds. `fetch` runs after
    /// admission, like in [`Assistant::handle_photo`].
    pub async fn handle_voice<F, Fut>(&self, who: &Caller, duration_secs: u32, fetch: F) -> Reply
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, BotError>>,
    {
        let result = match self.admit(who) {
            Ok(()) => self.voice(who, duration_secs, fetch).await,
            Err(e) => Err(e),
        };
        self.finish(who, result)
    }

    fn admit(&self, who: &Caller) -> Result<(), BotError> {
        if self.limiter.allow(who.user_id) {
            Ok(())
        } else {
            Err(BotError::RateLimited)
        }
    }

    fn finish(&self, who: &Caller, result: Result<Reply, BotError>) -> Reply {
        match result {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_soft() {
                    debug!("User {}: {}", who.user_id, e);
                } else if matches!(e, BotError::StoreUnavailable(_)) {
                    warn!("User {}: {}", who.user_id, e);
                } else {
                    error!("User {}: {}", who.user_id, e);
                }
                Reply::Text(error_text(who.lang, &e))
            }
        }
    }

    async fn chat(&self, who: &Caller, text: &str) -> Result<Reply, BotError> {
        let answer = self
            .gate
            .run(who.user_id, UsageKind::Message, 1, || async {
                let mut messages = self.context(who.user_id).await;
                messages.push(ChatMessage::user(text));
                self.ai.complete(&messages, who.persona).await
            })
            .await?;

        self.remember(who.user_id, text, &answer, MessageKind::Text).await;
        Ok(Reply::Text(html_escape(&answer)))
    }

    async fn generate_image(&self, who: &Caller, prompt: &str) -> Result<Reply, BotError> {
        if prompt.is_empty() {
            return Ok(Reply::Text(i18n::get_text(who.lang, "image.empty_prompt")));
        }

        let url = self
            .gate
            .run(who.user_id, UsageKind::Image, 1, || self.ai.generate_image(prompt))
            .await?;

        Ok(Reply::Photo {
            url,
            caption: t(who.lang, "image.caption", &[("prompt", &html_escape(prompt))]),
        })
    }

    async fn describe_image<F, Fut>(&self, who: &Caller, caption: Option<&str>, fetch: F) -> Result<Reply, BotError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, BotError>>,
    {
        let question = caption
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| i18n::get_text(who.lang, "image.default_question"));

        let answer = self
            .gate
            .run(who.user_id, UsageKind::Image, 1, || async {
                let image = fetch().await?;
                self.ai
                    .describe_image(&image, &question, who.persona)
                    .await
                    .map_err(BotError::from)
            })
            .await?;

        self.remember(who.user_id, &question, &answer, MessageKind::Image).await;
        Ok(Reply::Text(html_escape(&answer)))
    }

    async fn voice<F, Fut>(&self, who: &Caller, duration_secs: u32, fetch: F) -> Result<Reply, BotError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, BotError>>,
    {
        let minutes = voice_minutes(duration_secs);

        let turn = self
            .gate
            .run(who.user_id, UsageKind::VoiceMinute, minutes, || async {
                let audio = fetch().await?;
                let transcript = self.ai.transcribe(audio).await?;
                if transcript.is_empty() {
                    return Ok::<_, BotError>(None);
                }

                let mut messages = self.context(who.user_id).await;
                messages.push(ChatMessage::user(transcript.clone()));
                let answer = self.ai.complete(&messages, who.persona).await?;
                Ok(Some((transcript, answer)))
            })
            .await?;

        let Some((transcript, answer)) = turn else {
            return Ok(Reply::Text(i18n::get_text(who.lang, "voice.empty")));
        };
        self.remember(who.user_id, &transcript, &answer, MessageKind::Voice).await;

        let text = t(
            who.lang,
            "voice.transcript",
            &[("text", &html_escape(&transcript)), ("answer", &html_escape(&answer))],
        );
        let spoken = truncate_chars(&answer, MAX_SPEECH_CHARS);
        match self.ai.synthesize(spoken, &self.settings.tts_voice).await {
            Ok(audio) => Ok(Reply::Voice { audio, text }),
            Err(e) => {
                error!("Text-to-speech failed for {}, answering with text: {}", who.user_id, e);
                Ok(Reply::Text(text))
            }
        }
    }

    async fn create_reminder(&self, who: &Caller, text: &str) -> Result<Reply, BotError> {
        let tz = self.settings.timezone;
        let parsed = reminder_parser::parse(text, Utc::now().with_timezone(&tz))?;

        let reminder = self
            .reminders
            .insert(NewReminder {
                user_id: who.user_id,
                chat_id: who.chat_id,
                text: parsed.payload,
                fire_at: parsed.fire_at,
            })
            .await?;

        let time_format = i18n::get_text(who.lang, "reminder.time_format");
        let time = reminder.fire_time().with_timezone(&tz).format(&time_format).to_string();
        debug!("Reminder #{} for {} at {}", reminder.id, who.user_id, reminder.fire_at);

        Ok(Reply::Text(t(
            who.lang,
            "reminder.created",
            &[
                ("text", &html_escape(&reminder.text)),
                ("time", &time),
                ("id", &reminder.id.to_string()),
            ],
        )))
    }

    fn calculate(&self, who: &Caller, expr: &str) -> Result<Reply, BotError> {
        let value = calc::evaluate(expr)?;
        Ok(Reply::Text(t(
            who.lang,
            "calc.result",
            &[("expr", &html_escape(expr)), ("result", &calc::format_number(value))],
        )))
    }

    /// Recent dialog as chat messages. Store errors yield an empty context.
    async fn context(&self, user_id: u64) -> Vec<ChatMessage> {
        match self.history.recent(user_id, self.settings.max_history).await {
            Ok(history) => history.iter().map(ChatMessage::from).collect(),
            Err(e) => {
                warn!("Failed to load history for {}: {}", user_id, e);
                Vec::new()
            }
        }
    }

    async fn remember(&self, user_id: u64, question: &str, answer: &str, kind: MessageKind) {
        for (role, content) in [(Role::User, question), (Role::Assistant, answer)] {
            if let Err(e) = self.history.push(user_id, role, content, kind).await {
                warn!("Failed to save history for {}: {}", user_id, e);
                return;
            }
        }
    }
}

/// Billable minutes for a voice note: started minutes, at least one.
pub fn voice_minutes(duration_secs: u32) -> u32 {
    duration_secs.div_ceil(60).max(1)
}

/// User-facing text for a failed request.
pub fn error_text(lang: &str, err: &BotError) -> String {
    match err {
        BotError::RateLimited => i18n::get_text(lang, "errors.rate_limited"),
        BotError::QuotaExceeded { kind, used, limit, tier } => {
            let kind_key = format!("kinds.{}", kind.key());
            t(
                lang,
                "errors.quota",
                &[
                    ("kind", &i18n::get_text(lang, &kind_key)),
                    ("used", &used.to_string()),
                    ("limit", &limit.to_string()),
                    ("tier", tier.as_str()),
                ],
            )
        }
        BotError::Parse(e) => i18n::get_text(
            lang,
            match e.reason {
                ParseErrorKind::NoPattern => "reminder.help",
                ParseErrorKind::InvalidDateTime => "reminder.invalid_time",
                ParseErrorKind::EmptyPayload => "reminder.empty",
                ParseErrorKind::PayloadTooLong => "reminder.too_long",
                ParseErrorKind::TooFarAhead => "reminder.too_far",
                ParseErrorKind::InPast => "reminder.in_past",
            },
        ),
        BotError::Calc(e) => i18n::get_text(
            lang,
            match e {
                CalcError::Empty => "calc.usage",
                CalcError::InvalidCharacter(_) => "calc.invalid_chars",
                CalcError::DivisionByZero => "calc.div_zero",
                CalcError::TooLong | CalcError::Syntax(_) | CalcError::NotFinite => "calc.error",
            },
        ),
        BotError::Provider(_) => i18n::get_text(lang, "errors.provider"),
        BotError::StoreUnavailable(_) => i18n::get_text(lang, "errors.store"),
        BotError::Download(_) => i18n::get_text(lang, "errors.generic"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::database::MemoryStore;
    use crate::error::ProviderError;
    use crate::limits::Tier;

    /// Scripted provider that records what it was asked.
    #[derive(Default)]
    struct FakeProvider {
        calls: AtomicUsize,
        failing: AtomicBool,
        transcript: Mutex<String>,
        last_messages: Mutex<Vec<ChatMessage>>,
    }

    impl FakeProvider {
        fn call(&self) -> Result<(), ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(ProviderError::Api {
                    status: 500,
                    message: "boom".into(),
                })
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AiProvider for FakeProvider {
        async fn complete(&self, messages: &[ChatMessage], _persona: Persona) -> Result<String, ProviderError> {
            self.call()?;
            *self.last_messages.lock() = messages.to_vec();
            Ok(format!("answer {}", self.calls()))
        }

        async fn describe_image(&self, _image: &[u8], question: &str, _persona: Persona) -> Result<String, ProviderError> {
            self.call()?;
            Ok(format!("seen: {question}"))
        }

        async fn transcribe(&self, _audio: Vec<u8>) -> Result<String, ProviderError> {
            self.call()?;
            Ok(self.transcript.lock().clone())
        }

        async fn synthesize(&self, _text: &str, _voice: &str) -> Result<Vec<u8>, ProviderError> {
            self.call()?;
            Ok(vec![1, 2, 3])
        }

        async fn generate_image(&self, prompt: &str) -> Result<String, ProviderError> {
            self.call()?;
            Ok(format!("https://img.example/{}", prompt.len()))
        }
    }

    struct Fixture {
        assistant: Assistant,
        provider: Arc<FakeProvider>,
        store: Arc<MemoryStore>,
        who: Caller,
    }

    fn fixture(max_calls: usize) -> Fixture {
        let provider = Arc::new(FakeProvider::default());
        let store = Arc::new(MemoryStore::new());
        let assistant = Assistant::new(
            provider.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            RateLimiter::new(max_calls, Duration::from_secs(60)),
            PlanTable::default(),
            AssistantSettings {
                max_history: 16,
                timezone: FixedOffset::east_opt(3 * 3600).unwrap(),
                tts_voice: "alloy".into(),
            },
        );
        Fixture {
            assistant,
            provider,
            store,
            who: Caller {
                user_id: 42,
                chat_id: 42,
                lang: "ru",
                persona: Persona::Default,
            },
        }
    }

    #[tokio::test]
    async fn test_free_user_blocked_after_twenty_messages() {
        let f = fixture(100);

        for i in 1..=20 {
            let reply = f.assistant.handle_text(&f.who, &format!("вопрос {i}")).await;
            assert_eq!(reply, Reply::Text(format!("answer {i}")));
        }

        let reply = f.assistant.handle_text(&f.who, "вопрос 21").await;
        let expected = error_text(
            "ru",
            &BotError::QuotaExceeded {
                kind: UsageKind::Message,
                used: 20,
                limit: 20,
                tier: Tier::Free,
            },
        );
        assert_eq!(reply, Reply::Text(expected));
        assert!(reply.text().contains("20/20"));
        assert_eq!(f.provider.calls(), 20);
    }

    #[tokio::test]
    async fn test_provider_failure_costs_nothing() {
        let f = fixture(100);
        f.provider.failing.store(true, Ordering::SeqCst);

        let reply = f.assistant.handle_text(&f.who, "привет").await;
        assert_eq!(reply, Reply::Text(i18n::get_text("ru", "errors.provider")));

        let used = f.assistant.gate().usage().get_usage(42, UsageKind::Message).await.unwrap();
        assert_eq!(used, 0);
    }

    #[tokio::test]
    async fn test_rate_limit_precedes_everything() {
        let f = fixture(2);
        f.assistant.handle_text(&f.who, "один").await;
        f.assistant.handle_text(&f.who, "calc 1+1").await;

        let reply = f.assistant.handle_text(&f.who, "три").await;
        assert_eq!(reply, Reply::Text(i18n::get_text("ru", "errors.rate_limited")));
        assert_eq!(f.provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_chat_sends_history() {
        let f = fixture(100);
        f.assistant.handle_text(&f.who, "меня зовут Аня").await;
        f.assistant.handle_text(&f.who, "как меня зовут?").await;

        let sent = f.provider.last_messages.lock().clone();
        assert_eq!(
            sent,
            vec![
                ChatMessage::user("меня зовут Аня"),
                ChatMessage::assistant("answer 1"),
                ChatMessage::user("как меня зовут?"),
            ]
        );
    }

    #[tokio::test]
    async fn test_calc_and_reminder_use_no_quota() {
        let f = fixture(100);

        let reply = f.assistant.handle_text(&f.who, "calc 2+2*3").await;
        assert!(reply.text().contains("= <b>8</b>"), "{reply:?}");

        let reply = f.assistant.handle_text(&f.who, "calc 1/0").await;
        assert_eq!(reply, Reply::Text(i18n::get_text("ru", "calc.div_zero")));

        let reply = f.assistant.handle_text(&f.who, "напомни купить молоко через 30 минут").await;
        assert!(reply.text().contains("#1"), "{reply:?}");
        assert!(reply.text().contains("купить молоко"));

        let pending = f.store.pending_for(42).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].chat_id, 42);

        let reply = f.assistant.handle_text(&f.who, "напомни что-нибудь когда-нибудь").await;
        assert_eq!(reply, Reply::Text(i18n::get_text("ru", "reminder.help")));

        assert_eq!(f.provider.calls(), 0);
        assert_eq!(f.assistant.gate().usage().get_usage(42, UsageKind::Message).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_image_generation_counts_images() {
        let f = fixture(100);

        let reply = f.assistant.handle_text(&f.who, "нарисуй").await;
        assert_eq!(reply, Reply::Text(i18n::get_text("ru", "image.empty_prompt")));

        let reply = f.assistant.handle_text(&f.who, "нарисуй кота").await;
        assert!(matches!(reply, Reply::Photo { ref url, .. } if url.starts_with("https://img.example/")));
        assert_eq!(f.assistant.gate().usage().get_usage(42, UsageKind::Image).await.unwrap(), 1);

        let reply = f.assistant.handle_photo(&f.who, None, || async { Ok(vec![0xFF]) }).await;
        assert!(reply.text().starts_with("seen: "));
        assert_eq!(f.assistant.gate().usage().get_usage(42, UsageKind::Image).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_voice_bills_started_minutes() {
        let f = fixture(100);
        *f.provider.transcript.lock() = "какая погода".into();

        let reply = f.assistant.handle_voice(&f.who, 61, || async { Ok(vec![0]) }).await;
        match reply {
            Reply::Voice { audio, text } => {
                assert_eq!(audio, vec![1, 2, 3]);
                assert!(text.contains("какая погода"));
            }
            other => panic!("expected voice reply, got {other:?}"),
        }
        let used = f.assistant.gate().usage().get_usage(42, UsageKind::VoiceMinute).await.unwrap();
        assert_eq!(used, 2);
    }

    #[tokio::test]
    async fn test_media_not_fetched_when_refused() {
        let f = fixture(1);
        let counter = AtomicUsize::new(0);
        let fetches = &counter;
        let fetch = move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0xFF])
        };

        f.assistant.handle_text(&f.who, "calc 1+1").await;
        let reply = f.assistant.handle_photo(&f.who, Some("что это?"), fetch).await;
        assert_eq!(reply, Reply::Text(i18n::get_text("ru", "errors.rate_limited")));
        let reply = f.assistant.handle_voice(&f.who, 30, fetch).await;
        assert_eq!(reply, Reply::Text(i18n::get_text("ru", "errors.rate_limited")));
        assert_eq!(fetches.load(Ordering::SeqCst), 0);

        let f = fixture(100);
        f.store.add_usage(42, UsageKind::VoiceMinute, 10, Utc::now().date_naive()).await.unwrap();
        let reply = f.assistant.handle_voice(&f.who, 30, fetch).await;
        assert!(reply.text().contains("10/10"), "{reply:?}");
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
        assert_eq!(f.provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_download_costs_nothing() {
        let f = fixture(100);

        let reply = f
            .assistant
            .handle_photo(&f.who, None, || async { Err(BotError::Download("file is gone".into())) })
            .await;
        assert_eq!(reply, Reply::Text(i18n::get_text("ru", "errors.generic")));
        assert_eq!(f.provider.calls(), 0);
        assert_eq!(f.assistant.gate().usage().get_usage(42, UsageKind::Image).await.unwrap(), 0);
    }

    #[test]
    fn test_voice_minutes() {
        assert_eq!(voice_minutes(0), 1);
        assert_eq!(voice_minutes(1), 1);
        assert_eq!(voice_minutes(60), 1);
        assert_eq!(voice_minutes(61), 2);
        assert_eq!(voice_minutes(600), 10);
    }

    #[tokio::test]
    async fn test_caller_reads_profile() {
        let f = fixture(100);
        f.store.set_persona(7, "cynic").await.unwrap();
        f.store.set_language(7, "en").await.unwrap();

        let who = f.assistant.caller(7, 70, Some("ru")).await;
        assert_eq!(who.persona, Persona::Cynic);
        assert_eq!(who.lang, "en");

        let stranger = f.assistant.caller(8, 80, Some("en-GB")).await;
        assert_eq!(stranger.persona, Persona::Default);
        assert_eq!(stranger.lang, "en");
    }
}
