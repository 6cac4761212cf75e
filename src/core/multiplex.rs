//! Multi-sample generation on top of a provider that only returns one
//! completion per request.
//!
//! [`MultiSampleChat`] implements [`ChatModel`] by calling the wrapped
//! [`ChatCompletion`] once per requested sample. How those calls are issued is
//! decided by a [`SamplingPolicy`], kept separate from the wrapped client so
//! either can change on its own.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::debug;

use crate::core::domain::{ChatMessage, Generation, GenerationOptions, GenerationResult};
use crate::core::error::{Error, Result};
use crate::core::ports::{ChatCompletion, ChatModel};

/// How the `n` single-sample calls of one request are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingPolicy {
    /// One call after the other; the first failure stops the loop.
    #[default]
    Sequential,
    /// Up to `max_in_flight` calls at once; the next call starts only after
    /// one succeeds. Results keep call order. The first failure aborts the
    /// calls still running and no further call is started.
    Concurrent { max_in_flight: usize },
}

/// [`ChatModel`] that fans a multi-sample request out into single-sample calls.
#[derive(Clone)]
pub struct MultiSampleChat {
    inner: Arc<dyn ChatCompletion>,
    policy: SamplingPolicy,
}

impl MultiSampleChat {
    pub fn new(inner: Arc<dyn ChatCompletion>) -> Self {
        Self {
            inner,
            policy: SamplingPolicy::Sequential,
        }
    }

    pub fn with_policy(mut self, policy: SamplingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> SamplingPolicy {
        self.policy
    }

    async fn generate_sequential(
        &self,
        messages: &[ChatMessage],
        stop: Option<&[String]>,
        options: &GenerationOptions,
        n: usize,
    ) -> Result<Vec<Generation>> {
        let single = options.single();
        let mut generations = Vec::with_capacity(n);
        for index in 0..n {
            debug!(
                provider = self.inner.provider_name(),
                sample = index + 1,
                of = n,
                "requesting sample"
            );
            let result = self.inner.complete(messages, stop, &single).await?;
            generations.push(take_single(result, self.inner.provider_name())?);
        }
        Ok(generations)
    }

    async fn generate_concurrent(
        &self,
        messages: &[ChatMessage],
        stop: Option<&[String]>,
        options: &GenerationOptions,
        n: usize,
        max_in_flight: usize,
    ) -> Result<Vec<Generation>> {
        let messages: Arc<[ChatMessage]> = messages.into();
        let stop: Option<Arc<[String]>> = stop.map(Into::into);
        let single = options.single();

        let mut join_set: JoinSet<Result<(usize, Generation)>> = JoinSet::new();
        let spawn_sample = |join_set: &mut JoinSet<Result<(usize, Generation)>>, index: usize| {
            debug!(
                provider = self.inner.provider_name(),
                sample = index + 1,
                of = n,
                "requesting sample"
            );
            let inner = self.inner.clone();
            let messages = messages.clone();
            let stop = stop.clone();
            let single = single.clone();
            join_set.spawn(async move {
                let result = inner.complete(&messages, stop.as_deref(), &single).await?;
                Ok((index, take_single(result, inner.provider_name())?))
            });
        };

        let mut next_index = 0;
        while next_index < max_in_flight.max(1).min(n) {
            spawn_sample(&mut join_set, next_index);
            next_index += 1;
        }

        let mut slots: Vec<Option<Generation>> = vec![None; n];
        while let Some(joined) = join_set.join_next().await {
            let outcome = joined
                .map_err(|e| Error::System(format!("LLM task panic or cancellation: {e}")))
                .and_then(|inner| inner);
            match outcome {
                Ok((index, generation)) => {
                    slots[index] = Some(generation);
                    if next_index < n {
                        spawn_sample(&mut join_set, next_index);
                        next_index += 1;
                    }
                }
                Err(err) => {
                    join_set.abort_all();
                    return Err(err);
                }
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| Error::System("Sample slot left unfilled".into())))
            .collect()
    }
}

impl std::fmt::Debug for MultiSampleChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiSampleChat")
            .field("provider", &self.inner.provider_name())
            .field("policy", &self.policy)
            .finish()
    }
}

#[async_trait]
impl ChatModel for MultiSampleChat {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        stop: Option<&[String]>,
        options: &GenerationOptions,
    ) -> Result<GenerationResult> {
        if messages.is_empty() {
            return Err(Error::InvalidRequest(
                "At least one chat message is required".into(),
            ));
        }

        let n = options.n;
        if n == 0 {
            return Err(Error::InvalidRequest("Sample count must be >= 1".into()));
        }
        if n == 1 {
            return self.inner.complete(messages, stop, options).await;
        }

        let generations = match self.policy {
            SamplingPolicy::Sequential => {
                self.generate_sequential(messages, stop, options, n).await?
            }
            SamplingPolicy::Concurrent { max_in_flight } => {
                self.generate_concurrent(messages, stop, options, n, max_in_flight)
                    .await?
            }
        };
        Ok(GenerationResult::new(generations))
    }
}

fn take_single(result: GenerationResult, provider: &str) -> Result<Generation> {
    let count = result.len();
    let mut generations = result.generations.into_iter();
    match (generations.next(), count) {
        (Some(generation), 1) => Ok(generation),
        _ => Err(Error::MalformedResponse(format!(
            "{provider} returned {count} generations for a single-sample request"
        ))),
    }
}
