//! Session loop integration tests
//!
//! Runs full interaction cycles with scripted input against mock servers,
//! asserting on what the assistant would have spoken.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::routing::{get, post};
use tokio::sync::mpsc;

use aural::{
    ApiFlavor, CapturedInput, Config, Error, InputSource, ModelEndpoint, NoTranslation,
    SessionEvent, SessionLoop, Speaker, Transcriber, Transcript, Translator,
};

mod common;
use common::{dead_url, serve};

/// Input source that replays a fixed script, then reports end of input
struct ScriptedInput(VecDeque<CapturedInput>);

#[async_trait(?Send)]
impl InputSource for ScriptedInput {
    async fn next_input(&mut self) -> aural::Result<Option<CapturedInput>> {
        Ok(self.0.pop_front())
    }
}

/// Speaker that records everything it is asked to say
struct RecordingSpeaker(Arc<Mutex<Vec<String>>>);

#[async_trait(?Send)]
impl Speaker for RecordingSpeaker {
    async fn say(&mut self, text: &str) -> aural::Result<()> {
        self.0.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Transcriber that returns the same transcript for any audio
struct FixedTranscriber {
    text: &'static str,
    language: Option<&'static str>,
}

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> aural::Result<Transcript> {
        Ok(Transcript {
            text: self.text.to_string(),
            language: self.language.map(str::to_string),
        })
    }
}

struct FailingTranscriber;

#[async_trait]
impl Transcriber for FailingTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> aural::Result<Transcript> {
        Err(Error::Transcription("garbled audio".to_string()))
    }
}

/// Translator that returns a fixed translation for any input
struct ScriptedTranslator(&'static str);

#[async_trait]
impl Translator for ScriptedTranslator {
    async fn translate(&self, _text: &str, _target: &str) -> aural::Result<String> {
        Ok(self.0.to_string())
    }
}

/// Default config with every external URL pointed at a refused port
///
/// Tests override the services they exercise; a cycle that touches anything
/// else fails loudly instead of reaching a real server.
async fn isolated_config() -> Config {
    let nowhere = dead_url().await;
    let mut config = Config::default();
    config.endpoints = vec![ModelEndpoint {
        name: "primary".to_string(),
        url: nowhere.clone(),
        api: ApiFlavor::Generate,
    }];
    config.home.url = nowhere.clone();
    config.home.token = Some("test-token".to_string());
    config.weather.api_key = Some("test-key".to_string());
    config.weather.api_url = nowhere.clone();
    config.weather.geo_url = nowhere;
    config
}

/// Run a session over a script and collect spoken output and events
async fn run_session(
    config: &Config,
    script: Vec<CapturedInput>,
    transcriber: Box<dyn Transcriber>,
    translator: Box<dyn Translator>,
) -> (Vec<String>, Vec<SessionEvent>) {
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let session = SessionLoop::from_config(
        config,
        Box::new(ScriptedInput(script.into())),
        transcriber,
        Box::new(RecordingSpeaker(Arc::clone(&spoken))),
        translator,
    )
    .unwrap();

    let mut rx = session.event_bus().subscribe();
    let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);
    session.run(shutdown_rx).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    let spoken = spoken.lock().unwrap().clone();
    (spoken, events)
}

/// Ollama-style mock that counts requests
fn counting_generate(reply: &'static str) -> (Router, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let handler_hits = Arc::clone(&hits);
    let app = Router::new().route(
        "/api/generate",
        post(move || {
            let hits = Arc::clone(&handler_hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                format!("{{\"response\":\"{reply}\",\"done\":true}}\n")
            }
        }),
    );
    (app, hits)
}

/// Home Assistant mock serving one service route, counting requests
fn counting_home_service(path: &'static str) -> (Router, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let handler_hits = Arc::clone(&hits);
    let app = Router::new().route(
        path,
        post(move || {
            let hits = Arc::clone(&handler_hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                "[]"
            }
        }),
    );
    (app, hits)
}

fn text(line: &str) -> CapturedInput {
    CapturedInput::Text(line.to_string())
}

fn silent_transcriber() -> Box<dyn Transcriber> {
    Box::new(FixedTranscriber {
        text: "",
        language: None,
    })
}

#[tokio::test]
async fn test_cycle_without_hotword_stays_silent() {
    let (model_app, model_hits) = counting_generate("should never be asked");
    let (home_app, home_hits) = counting_home_service("/api/services/light/turn_on");
    let (model_url, model_shutdown) = serve(model_app).await;
    let (home_url, home_shutdown) = serve(home_app).await;

    let mut config = isolated_config().await;
    config.endpoints[0].url = model_url;
    config.home.url = home_url;

    let (spoken, events) = run_session(
        &config,
        vec![text("turn on the kitchen lights")],
        silent_transcriber(),
        Box::new(NoTranslation),
    )
    .await;

    assert!(spoken.is_empty());
    assert_eq!(model_hits.load(Ordering::SeqCst), 0);
    assert_eq!(home_hits.load(Ordering::SeqCst), 0);

    let completed = events
        .iter()
        .find_map(|e| match e {
            SessionEvent::CycleCompleted { result } => Some(result),
            _ => None,
        })
        .unwrap();
    assert!(completed.hotword.is_none());
    assert!(completed.spoken.is_none());

    model_shutdown.send(()).ok();
    home_shutdown.send(()).ok();
}

#[tokio::test]
async fn test_home_command_skips_the_model() {
    let (model_app, model_hits) = counting_generate("should never be asked");
    let (home_app, home_hits) = counting_home_service("/api/services/light/turn_on");
    let (model_url, model_shutdown) = serve(model_app).await;
    let (home_url, home_shutdown) = serve(home_app).await;

    let mut config = isolated_config().await;
    config.endpoints[0].url = model_url;
    config.home.url = home_url;

    let (spoken, events) = run_session(
        &config,
        vec![text("hey llama turn on the kitchen lights")],
        silent_transcriber(),
        Box::new(NoTranslation),
    )
    .await;

    assert_eq!(spoken, vec!["kitchen lights turned on.".to_string()]);
    assert_eq!(model_hits.load(Ordering::SeqCst), 0);
    assert_eq!(home_hits.load(Ordering::SeqCst), 1);

    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::HotwordMatched { phrase, .. } if phrase == "hey llama"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::ActionDispatched { intent, success: true, .. } if intent == "home_automation"
    )));

    model_shutdown.send(()).ok();
    home_shutdown.send(()).ok();
}

#[tokio::test]
async fn test_weather_command_speaks_the_report() {
    let geo = Router::new().route(
        "/json/",
        get(|| async { r#"{"status":"success","city":"Austin","regionName":"Texas"}"# }),
    );
    let weather = Router::new().route(
        "/data/2.5/weather",
        get(|| async { r#"{"weather":[{"main":"Clear"}],"main":{"temp":72.0}}"# }),
    );
    let (geo_url, geo_shutdown) = serve(geo).await;
    let (weather_url, weather_shutdown) = serve(weather).await;

    let mut config = isolated_config().await;
    config.weather.geo_url = geo_url;
    config.weather.api_url = weather_url;

    let (spoken, _) = run_session(
        &config,
        vec![text("hey llama what's the weather like")],
        silent_transcriber(),
        Box::new(NoTranslation),
    )
    .await;

    assert_eq!(spoken, vec!["It's clear and 72 degrees.".to_string()]);

    geo_shutdown.send(()).ok();
    weather_shutdown.send(()).ok();
}

#[tokio::test]
async fn test_model_reply_is_spoken() {
    let (model_app, model_hits) =
        counting_generate("Why did the speaker blush? It saw the amp.");
    let (model_url, model_shutdown) = serve(model_app).await;

    let mut config = isolated_config().await;
    config.endpoints[0].url = model_url;

    let (spoken, events) = run_session(
        &config,
        vec![text("hey llama tell me a joke")],
        silent_transcriber(),
        Box::new(NoTranslation),
    )
    .await;

    assert_eq!(
        spoken,
        vec!["Why did the speaker blush? It saw the amp.".to_string()]
    );
    assert_eq!(model_hits.load(Ordering::SeqCst), 1);

    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::ModelReplied { endpoint, .. } if endpoint == "primary"
    )));

    model_shutdown.send(()).ok();
}

#[tokio::test]
async fn test_first_endpoint_down_uses_backup() {
    let chat = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            r#"{"choices":[{"message":{"role":"assistant","content":"Backup here."}}]}"#
        }),
    );
    let (backup_url, shutdown_tx) = serve(chat).await;
    let nowhere = dead_url().await;

    let mut config = isolated_config().await;
    config.endpoints = vec![
        ModelEndpoint {
            name: "ollama".to_string(),
            url: nowhere,
            api: ApiFlavor::Generate,
        },
        ModelEndpoint {
            name: "backup".to_string(),
            url: backup_url,
            api: ApiFlavor::Chat,
        },
    ];

    let (spoken, _) = run_session(
        &config,
        vec![text("hey llama hello there")],
        silent_transcriber(),
        Box::new(NoTranslation),
    )
    .await;

    assert_eq!(spoken, vec!["Backup here.".to_string()]);

    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_all_endpoints_down_speaks_unavailable_once() {
    let config = isolated_config().await;

    let (spoken, events) = run_session(
        &config,
        vec![text("hey llama hello there")],
        silent_transcriber(),
        Box::new(NoTranslation),
    )
    .await;

    assert_eq!(
        spoken,
        vec!["Assistant unavailable. Check that your model server is running.".to_string()]
    );

    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::CycleFailed { phase, .. } if phase == "querying"
    )));
}

#[tokio::test]
async fn test_garbled_audio_gets_an_apology() {
    let config = isolated_config().await;

    let (spoken, _) = run_session(
        &config,
        vec![CapturedInput::Audio(vec![0; 16])],
        Box::new(FailingTranscriber),
        Box::new(NoTranslation),
    )
    .await;

    assert_eq!(spoken, vec!["Sorry, I didn't catch that.".to_string()]);
}

#[tokio::test]
async fn test_bare_hotword_prompts_for_more() {
    let (model_app, model_hits) = counting_generate("should never be asked");
    let (model_url, model_shutdown) = serve(model_app).await;

    let mut config = isolated_config().await;
    config.endpoints[0].url = model_url;

    let (spoken, _) = run_session(
        &config,
        vec![text("hey llama")],
        silent_transcriber(),
        Box::new(NoTranslation),
    )
    .await;

    assert_eq!(spoken, vec!["Yes?".to_string()]);
    assert_eq!(model_hits.load(Ordering::SeqCst), 0);

    model_shutdown.send(()).ok();
}

#[tokio::test]
async fn test_foreign_utterance_is_translated_before_matching() {
    let (home_app, home_hits) = counting_home_service("/api/services/light/turn_on");
    let (home_url, home_shutdown) = serve(home_app).await;

    let mut config = isolated_config().await;
    config.home.url = home_url;

    let (spoken, _) = run_session(
        &config,
        vec![CapturedInput::Audio(vec![0; 16])],
        Box::new(FixedTranscriber {
            text: "oye llama enciende las luces de la cocina",
            language: Some("es"),
        }),
        Box::new(ScriptedTranslator("Hey llama turn on the kitchen lights")),
    )
    .await;

    assert_eq!(spoken, vec!["kitchen lights turned on.".to_string()]);
    assert_eq!(home_hits.load(Ordering::SeqCst), 1);

    home_shutdown.send(()).ok();
}
