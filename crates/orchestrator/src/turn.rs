//! The function-calling turn loop.
//!
//! Per model reply: dispatch every function call concurrently, emit the
//! text parts in order, join all calls, and answer the model with the
//! results in their original call order.  Repeats until a reply has no
//! calls, a fatal condition occurs, or the consumer goes away.

use std::sync::Arc;

use tm_agent::{into_tool_result, FunctionCaller};
use tm_domain::config::ToolErrorPolicy;
use tm_domain::content::{FinishReason, FunctionCall, ModelResponse, Part};
use tm_domain::{Error, Result};
use tm_providers::ChatSession;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::options::SessionOptions;
use crate::stream::TextSink;

pub(crate) async fn run(
    chat: &mut dyn ChatSession,
    caller: Arc<dyn FunctionCaller>,
    options: Arc<SessionOptions>,
    prompt: Vec<Part>,
    sink: &TextSink,
) -> Result<()> {
    let mut response = chat.send(prompt).await?;
    let mut round_trips = 1usize;

    loop {
        let span = tracing::info_span!("turn", n = round_trips);
        let next = step(response, round_trips, &caller, &options, sink)
            .instrument(span)
            .await?;
        match next {
            Some(results) => {
                response = chat.send(results).await?;
                round_trips += 1;
            }
            None => return Ok(()),
        }
    }
}

/// Handle one model reply.  Returns the function responses to send back,
/// or `None` when the session is over.
async fn step(
    response: ModelResponse,
    round_trips: usize,
    caller: &Arc<dyn FunctionCaller>,
    options: &Arc<SessionOptions>,
    sink: &TextSink,
) -> Result<Option<Vec<Part>>> {
    if response.finish_reason == Some(FinishReason::MalformedFunctionCall) {
        tracing::warn!("model produced a malformed function call");
        return Err(Error::MalformedFunctionCall);
    }

    // A follow-up reply without usage metadata ends the session.
    let last = round_trips > 1 && response.usage.is_none();
    let (texts, calls) = split(response);
    let fanout = if last {
        Fanout::default()
    } else {
        Fanout::dispatch(calls, caller, options)
    };

    for text in texts {
        if !sink.emit(Ok(text)).await {
            tracing::debug!("consumer stopped pulling");
            fanout.drain().await;
            return Ok(None);
        }
    }

    if fanout.is_empty() {
        return Ok(None);
    }
    let results = fanout.join().await?;
    if sink.is_closed() {
        return Ok(None);
    }
    if round_trips >= options.max_turns {
        return Err(Error::TurnLimit(round_trips));
    }
    Ok(Some(results))
}

fn split(response: ModelResponse) -> (Vec<String>, Vec<FunctionCall>) {
    let mut texts = Vec::new();
    let mut calls = Vec::new();
    for part in response.parts {
        match part {
            Part::Text { text } => texts.push(text),
            Part::FunctionCall(fc) => calls.push(fc),
            Part::FunctionResponse(_) => {}
        }
    }
    (texts, calls)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fan-out / fan-in
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct Fanout {
    set: JoinSet<(usize, Result<Part>)>,
    len: usize,
}

impl Fanout {
    fn dispatch(calls: Vec<FunctionCall>, caller: &Arc<dyn FunctionCaller>, options: &Arc<SessionOptions>) -> Self {
        let mut set = JoinSet::new();
        let len = calls.len();
        if len > 0 {
            tracing::debug!(calls = len, "dispatching function calls");
        }
        for (index, call) in calls.into_iter().enumerate() {
            let span = tracing::info_span!("tool.call", tool = %call.name, index);
            let caller = caller.clone();
            let options = options.clone();
            set.spawn(
                async move { (index, invoke(caller.as_ref(), &options, call).await) }.instrument(span),
            );
        }
        Self { set, len }
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Wait for every call, discarding results.
    async fn drain(mut self) {
        while self.set.join_next().await.is_some() {}
    }

    /// Wait for every call and return the responses in call order.  When
    /// several calls fail, the one with the lowest position is reported.
    async fn join(mut self) -> Result<Vec<Part>> {
        let mut slots: Vec<Option<Result<Part>>> = (0..self.len).map(|_| None).collect();
        let mut task_failure = None;
        while let Some(joined) = self.set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => {
                    tracing::error!(error = %e, "tool call task failed");
                    task_failure.get_or_insert_with(|| e.to_string());
                }
            }
        }

        let mut parts = Vec::with_capacity(self.len);
        for slot in slots {
            match slot {
                Some(Ok(part)) => parts.push(part),
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(Error::Other(format!(
                        "tool call task failed: {}",
                        task_failure.take().unwrap_or_default()
                    )))
                }
            }
        }
        Ok(parts)
    }
}

async fn invoke(caller: &dyn FunctionCaller, options: &SessionOptions, call: FunctionCall) -> Result<Part> {
    let FunctionCall { name, mut args } = call;
    if let Some(defaults) = &options.default_args {
        args.merge_missing(&defaults());
    }

    let local = if options.use_local_tool {
        caller.call_local(&name, args.clone()).await
    } else {
        None
    };
    let response = match local {
        Some(r) => r,
        None => caller.call_function(&name, args).await?,
    };

    let response = match options.tool_error_policy {
        ToolErrorPolicy::Abort => into_tool_result(&name, response)?,
        ToolErrorPolicy::ReportToModel => response,
    };
    Ok(Part::response(name, response))
}
