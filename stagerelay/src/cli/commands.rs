//! Command handlers. Each returns the process exit code.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

use super::{GlobalArgs, RunEventArgs};
use crate::config::RelayConfig;
use crate::core::{StageRequest, TriggerEvent};
use crate::dispatch::{DisabledDispatcher, Dispatcher, GitHubDispatcher, Outbox, OutboxDispatcher};
use crate::errors::{RelayError, ValidationError};
use crate::events::WebhookStatusSink;
use crate::pipeline::StageExecutor;
use crate::providers::provider_for_stage;
use crate::stages::StagePorts;
use crate::store::FsResultStore;

const EXIT_OK: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_INVALID: u8 = 2;

fn invalid(err: &ValidationError) -> u8 {
    error!(error = %err, "Invalid invocation");
    EXIT_INVALID
}

fn load(global: &GlobalArgs) -> Result<RelayConfig, u8> {
    global.load_config().map_err(|e| {
        error!(error = %format!("{e:#}"), "Configuration not loaded");
        EXIT_INVALID
    })
}

/// Builds the production adapters for one invocation.
pub(super) fn build_ports(config: &RelayConfig, request: &StageRequest) -> Result<StagePorts, RelayError> {
    let stage = request.stage();
    config.validate_for(stage)?;

    let provider = provider_for_stage(config, stage)?;
    let store = Arc::new(FsResultStore::new(&config.results_dir));

    let dispatcher: Arc<dyn Dispatcher> = if stage.is_terminal() {
        Arc::new(DisabledDispatcher)
    } else {
        let github = GitHubDispatcher::new(&config.dispatch)
            .map_err(|e| ValidationError::invalid("dispatch", e))?;
        match config.outbox_dir {
            Some(ref dir) => Arc::new(OutboxDispatcher::new(Arc::new(github), Outbox::new(dir))),
            None => Arc::new(github),
        }
    };

    let sink = WebhookStatusSink::new(&request.webhook_url, config.status.timeout_for(stage))
        .map_err(|e| ValidationError::invalid("webhook_url", e))?;

    Ok(StagePorts::new(provider, store)
        .with_dispatcher(dispatcher)
        .with_sink(Arc::new(sink)))
}

/// Runs one stage request with the production adapters.
pub(super) async fn run_request(
    global: &GlobalArgs,
    request: Result<StageRequest, ValidationError>,
) -> u8 {
    let request = match request {
        Ok(request) => request,
        Err(e) => return invalid(&e),
    };
    let config = match load(global) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let ports = match build_ports(&config, &request) {
        Ok(ports) => ports,
        Err(e) => {
            error!(stage = %request.stage(), error = %e, "Stage not started");
            return e.exit_code();
        }
    };

    match StageExecutor::from_config(ports, &config).execute(&request).await {
        Ok(outcome) => {
            if outcome.has_warnings() {
                warn!(report = %outcome.report, dispatch = %outcome.dispatch, "Stage completed with warnings");
            }
            println!("{}", outcome.summary_line());
            EXIT_OK
        }
        Err(e) => e.exit_code(),
    }
}

async fn read_payload(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("reading payload from stdin")?;
        Ok(buf)
    } else {
        tokio::fs::read_to_string(Path::new(source))
            .await
            .with_context(|| format!("reading payload from {source}"))
    }
}

/// Runs the stage named by a trigger event.
pub(super) async fn run_event(global: &GlobalArgs, args: &RunEventArgs) -> u8 {
    let json = match read_payload(&args.payload).await {
        Ok(json) => json,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Payload not read");
            return EXIT_INVALID;
        }
    };
    let request = TriggerEvent::from_json(&json).and_then(|event| {
        info!(event_type = %event.event_type, stage = %event.stage(), "Trigger received");
        event.into_request()
    });
    run_request(global, request).await
}

fn outbox_for(config: &RelayConfig) -> Result<Outbox, u8> {
    match config.outbox_dir {
        Some(ref dir) => Ok(Outbox::new(dir)),
        None => Err(invalid(&ValidationError::missing("outbox_dir"))),
    }
}

/// Prints every parked trigger.
pub(super) async fn outbox_list(global: &GlobalArgs) -> u8 {
    let outbox = match load(global).and_then(|c| outbox_for(&c)) {
        Ok(outbox) => outbox,
        Err(code) => return code,
    };
    match outbox.list().await {
        Ok(entries) => {
            for entry in &entries {
                let payload = &entry.event.client_payload;
                println!(
                    "{} {} {} attempts={} stored_at={} last_error={}",
                    entry.id, payload.stage, payload.symbol, entry.attempts, entry.stored_at, entry.last_error
                );
            }
            info!(count = entries.len(), dir = %outbox.dir().display(), "Outbox listed");
            EXIT_OK
        }
        Err(e) => {
            error!(error = %e, "Outbox not readable");
            EXIT_FAILED
        }
    }
}

/// Re-sends every parked trigger.
pub(super) async fn outbox_flush(global: &GlobalArgs) -> u8 {
    let config = match load(global) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let outbox = match outbox_for(&config) {
        Ok(outbox) => outbox,
        Err(code) => return code,
    };
    let dispatcher = match GitHubDispatcher::new(&config.dispatch) {
        Ok(d) => d,
        Err(e) => return invalid(&ValidationError::invalid("dispatch", e)),
    };

    match outbox.flush(&dispatcher, &config.outbox_retry).await {
        Ok(report) => {
            println!("delivered {}, pending {}", report.delivered, report.failed);
            if report.failed == 0 { EXIT_OK } else { EXIT_FAILED }
        }
        Err(e) => {
            error!(error = %e, "Outbox flush failed");
            EXIT_FAILED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{StageInput, WorkKey};
    use crate::testing::{fast_request, final_request};

    fn configured() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.openai.api_key = Some("sk-test".to_string());
        config.anthropic.api_key = Some("ant-test".to_string());
        config.dispatch.repository = Some("acme/pipeline".to_string());
        config.dispatch.token = Some("ghp-test".to_string());
        config
    }

    #[test]
    fn test_build_ports_requires_credentials() {
        let err = build_ports(&RelayConfig::default(), &fast_request("BTCUSD")).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INVALID);
    }

    #[test]
    fn test_build_ports_for_each_stage() {
        let config = configured();
        let ports = build_ports(&config, &fast_request("BTCUSD")).unwrap();
        assert_eq!(ports.provider.name(), "openai");

        let deep = StageRequest::new(
            WorkKey::new("BTCUSD").unwrap(),
            StageInput::DeepAnalysis {
                stage1_output: "T1".to_string(),
            },
            "https://dash.example.com/hook",
        )
        .unwrap();
        assert_eq!(build_ports(&config, &deep).unwrap().provider.name(), "anthropic");
    }

    #[test]
    fn test_final_stage_needs_no_dispatch_settings() {
        let mut config = configured();
        config.dispatch.token = None;
        assert!(build_ports(&config, &final_request("BTCUSD", "T1", "T2")).is_ok());
        assert!(build_ports(&config, &fast_request("BTCUSD")).is_err());
    }

    #[test]
    fn test_unbounded_timeouts_are_rejected_before_building_clients() {
        let mut config = configured();
        config.status.timeout_seconds = f64::INFINITY;
        let err = build_ports(&config, &fast_request("BTCUSD")).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INVALID);

        let mut config = configured();
        config.dispatch.timeout_seconds = 1e300;
        let err = build_ports(&config, &fast_request("BTCUSD")).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INVALID);
    }

    #[tokio::test]
    async fn test_outbox_flush_with_unbounded_dispatch_timeout_exits_2() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("relay.toml");
        std::fs::write(
            &config_path,
            "[dispatch]\nrepository = \"acme/pipeline\"\ntoken = \"ghp-test\"\ntimeout_seconds = 1e300\n",
        )
        .unwrap();
        let global = GlobalArgs {
            config: Some(config_path),
            outbox_dir: Some(dir.path().join("outbox")),
            ..GlobalArgs::default()
        };
        assert_eq!(outbox_flush(&global).await, EXIT_INVALID);
    }

    #[tokio::test]
    async fn test_invalid_request_exits_2() {
        let code = run_request(&GlobalArgs::default(), Err(ValidationError::missing("symbol"))).await;
        assert_eq!(code, EXIT_INVALID);
    }

    #[tokio::test]
    async fn test_missing_credentials_exit_2() {
        let code = run_request(&GlobalArgs::default(), Ok(fast_request("BTCUSD"))).await;
        assert_eq!(code, EXIT_INVALID);
    }

    #[tokio::test]
    async fn test_run_event_with_bad_payload_exits_2() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, r#"{"symbol":"BTCUSD","stage":"deep-analysis"}"#).unwrap();

        let args = RunEventArgs {
            payload: path.display().to_string(),
        };
        assert_eq!(run_event(&GlobalArgs::default(), &args).await, EXIT_INVALID);
    }

    #[tokio::test]
    async fn test_outbox_requires_dir() {
        assert_eq!(outbox_list(&GlobalArgs::default()).await, EXIT_INVALID);
        assert_eq!(outbox_flush(&GlobalArgs::default()).await, EXIT_INVALID);
    }

    #[tokio::test]
    async fn test_outbox_list_of_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let global = GlobalArgs {
            outbox_dir: Some(dir.path().to_path_buf()),
            ..GlobalArgs::default()
        };
        assert_eq!(outbox_list(&global).await, EXIT_OK);
    }
}
