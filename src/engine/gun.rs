//! Scenario gun: runs the steps of one ammo in order
//!
//! Each step goes preprocess -> template -> dispatch -> read response ->
//! postprocess -> report -> sleep. Every started step reports exactly one
//! sample; a failure in any stage reports the sample and abandons the rest
//! of the shot.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::HOST;
use http::{HeaderName, HeaderValue};
use serde_json::Map;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use url::Url;

use crate::aggregator::Aggregator;
use crate::client::{resolve_target, Client, Request, Response, ResponseHead};
use crate::config::AnswerLogFilter;
use crate::context::TemplateContext;
use crate::errors::{Result, ShootError};
use crate::process::{ExtractionErrors, PostprocessError};
use crate::sample::Sample;
use crate::scenario::{Ammo, Step};
use crate::template::{RequestParts, Templater};

/// tracing target receiving request/response dumps
pub const ANSWER_LOG_TARGET: &str = "quicshot::answers";

/// Bodies longer than this are cut in debug and answer dumps
const MAX_DUMP_BODY: usize = 64 * 1024;

pub struct ScenarioGun<C> {
    client: Arc<C>,
    aggregator: Arc<dyn Aggregator>,
    templater: Arc<Templater>,
    target: Option<Url>,
    answer_log: AnswerLogFilter,
    debug: bool,
    cancel: CancellationToken,
}

impl<C: Client> ScenarioGun<C> {
    pub fn new(client: Arc<C>, aggregator: Arc<dyn Aggregator>) -> Self {
        Self {
            client,
            aggregator,
            templater: Arc::new(Templater::new()),
            target: None,
            answer_log: AnswerLogFilter::Off,
            debug: tracing::enabled!(Level::DEBUG),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_target(mut self, target: Option<Url>) -> Self {
        self.target = target;
        self
    }

    pub fn with_answer_log(mut self, filter: AnswerLogFilter) -> Self {
        self.answer_log = filter;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_templater(mut self, templater: Arc<Templater>) -> Self {
        self.templater = templater;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run one shot; a failure is logged and the rest of the shot dropped
    pub async fn shoot(&self, ammo: &Ammo) {
        match self.shoot_ammo(ammo).await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => {
                debug!(ammo_id = ammo.id(), scenario = ammo.name(), "Shot cancelled");
            }
            Err(err) => {
                warn!(ammo_id = ammo.id(), scenario = ammo.name(), error = %err, "Shot failed");
            }
        }
    }

    /// Run one shot and return the first step error.
    ///
    /// The scenario's minimum waiting time is only enforced when every step
    /// succeeded.
    pub async fn shoot_ammo(&self, ammo: &Ammo) -> Result<()> {
        let start = Instant::now();
        let scenario = ammo.scenario();
        let mut ctx = TemplateContext::new(ammo.store().clone());

        let salt = self.answer_log.is_enabled().then(rand::random::<u32>);

        for step in &scenario.steps {
            if self.cancel.is_cancelled() {
                return Err(ShootError::Cancelled);
            }
            let log_id = salt.map(|s| format!("{}.{:08x}.{}.{}", scenario.name, s, ammo.id(), step.name));
            self.shoot_step(step, &scenario.name, &mut ctx, log_id.as_deref()).await?;
        }

        let elapsed = start.elapsed();
        if scenario.min_waiting_time > elapsed {
            self.sleep(scenario.min_waiting_time - elapsed)
                .await
                .map_err(|e| e.with_op("min waiting time"))?;
        }

        Ok(())
    }

    async fn shoot_step(
        &self,
        step: &Step,
        scenario: &str,
        ctx: &mut TemplateContext,
        log_id: Option<&str>,
    ) -> Result<()> {
        let mut sample = Sample::start(format!("{}.{}", scenario, step.tag));
        ctx.begin_step(&step.name);

        if let Some(pre) = &step.preprocessor {
            match pre.process(ctx) {
                Ok(vars) => ctx.set_preprocessed(&step.name, vars),
                Err(e) => return Err(self.fail(sample, e.with_op("preprocess"))),
            }
        }

        let mut parts = step.request_parts();
        if let Err(e) = self.templater.apply(&mut parts, ctx, step.templater, scenario, &step.name) {
            return Err(self.fail(sample, e.with_op("template")));
        }

        let request = match self.build_request(step, parts) {
            Ok(req) => req,
            Err(e) => return Err(self.fail(sample, e.with_op("build request"))),
        };
        sample.request_bytes = request.wire_size();

        let request_dump = (self.debug || log_id.is_some()).then(|| dump_request(&request));
        if self.debug {
            if let Some(dump) = &request_dump {
                debug!(step = %step.name, request = %dump, "Sending request");
            }
        }

        let sent_at = Instant::now();
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ShootError::Cancelled),
            res = self.client.send(request) => res.map_err(ShootError::Transport),
        };
        let Response { head, body } = match sent {
            Ok(response) => response,
            Err(e) => return Err(self.fail(sample, e.with_op("dispatch"))),
        };
        sample.send_time = sent_at.elapsed();

        let status = head.status.as_u16();
        let answer = log_id.is_some() && self.answer_log.accepts(status);
        let keep_body = self.debug || answer || step.postprocessors_need_body();

        let received_at = Instant::now();
        let read = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ShootError::Cancelled),
            res = async move {
                if keep_body {
                    body.read_all().await.map(|b| (b.len() as u64, b))
                } else {
                    body.drain().await.map(|n| (n, Bytes::new()))
                }
            } => res.map_err(ShootError::Body),
        };
        let (body_len, body) = match read {
            Ok(read) => read,
            Err(e) => {
                // The status is already known; report it as received
                let err = e.with_op("read body");
                sample.receive_time = received_at.elapsed();
                sample.response_bytes = head.wire_size();
                sample.set_proto_code(status);
                sample.set_error(&err);
                sample.finish();
                self.aggregator.report(sample);
                return Err(err);
            }
        };
        sample.receive_time = received_at.elapsed();
        sample.response_bytes = head.wire_size() + body_len;

        if self.debug {
            debug!(step = %step.name, response = %dump_response(&head, &body), "Received response");
        }
        if answer {
            info!(
                target: ANSWER_LOG_TARGET,
                id = log_id.unwrap_or_default(),
                request = request_dump.as_deref().unwrap_or_default(),
                response = %dump_response(&head, &body),
                "answer"
            );
        }

        let outcome = self.postprocess(step, ctx, &head, &body);

        sample.set_proto_code(status);
        if let Err(e) = &outcome {
            sample.set_error(e);
        }
        sample.finish();
        self.aggregator.report(sample);

        outcome.map_err(|e| e.with_op("postprocess"))?;

        if !step.sleep.is_zero() {
            self.sleep(step.sleep).await.map_err(|e| e.with_op("sleep"))?;
        }

        Ok(())
    }

    /// Run postprocessors in order and publish their outputs.
    ///
    /// Extraction failures are collected across postprocessors; an assertion
    /// failure stops the remaining ones.
    fn postprocess(
        &self,
        step: &Step,
        ctx: &mut TemplateContext,
        head: &ResponseHead,
        body: &[u8],
    ) -> Result<()> {
        if step.postprocessors.is_empty() {
            return Ok(());
        }

        let mut outputs = Map::new();
        let mut extraction = ExtractionErrors::new();
        let mut failure = None;

        for pp in &step.postprocessors {
            match pp.process(&mut outputs, head, body) {
                Ok(()) => {}
                Err(PostprocessError::Extraction(e)) => extraction.extend(e),
                Err(PostprocessError::Assertion(e)) => {
                    failure = Some(ShootError::Assertion(e));
                    break;
                }
            }
        }

        ctx.set_postprocessed(&step.name, outputs);

        match failure {
            Some(e) => Err(e),
            None => extraction.into_result().map_err(ShootError::Extraction),
        }
    }

    fn build_request(&self, step: &Step, parts: RequestParts) -> Result<Request> {
        let resolved = resolve_target(&parts.url, self.target.as_ref()).map_err(ShootError::Request)?;
        let mut request = Request::new(step.method.clone(), resolved.url);

        for (name, value) in &parts.headers {
            let header = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|e| ShootError::Request(format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ShootError::Request(format!("invalid value for header '{}': {}", name, e)))?;
            request.headers.append(header, value);
        }

        // A step header wins over the authority of a retargeted URL
        if let Some(host) = resolved.host {
            if !request.headers.contains_key(HOST) {
                let value = HeaderValue::from_str(&host)
                    .map_err(|e| ShootError::Request(format!("invalid host '{}': {}", host, e)))?;
                request.headers.insert(HOST, value);
            }
        }

        request.body = parts.body.map(Bytes::from);
        Ok(request)
    }

    /// Report a failed step as an empty-tagged, status 0 sample
    fn fail(&self, mut sample: Sample, err: ShootError) -> ShootError {
        sample.fail(&err);
        sample.finish();
        self.aggregator.report(sample);
        err
    }

    async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ShootError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

fn dump_request(req: &Request) -> String {
    let mut out = format!("{} {} HTTP/1.1\n", req.method, req.url);
    for (name, value) in &req.headers {
        let _ = writeln!(out, "{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    if let Some(body) = &req.body {
        out.push('\n');
        out.push_str(&truncated(body));
    }
    out
}

fn dump_response(head: &ResponseHead, body: &[u8]) -> String {
    let mut out = head.status_line();
    out.push('\n');
    for (name, value) in &head.headers {
        let _ = writeln!(out, "{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    if !body.is_empty() {
        out.push('\n');
        out.push_str(&truncated(body));
    }
    out
}

fn truncated(body: &[u8]) -> String {
    if body.len() > MAX_DUMP_BODY {
        format!(
            "{}... ({} bytes total)",
            String::from_utf8_lossy(&body[..MAX_DUMP_BODY]),
            body.len()
        )
    } else {
        String::from_utf8_lossy(body).to_string()
    }
}
