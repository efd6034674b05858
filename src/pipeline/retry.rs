//! Per-page retry state machine.
//!
//! [`transition`] is a pure function from the current [`PageState`] and an
//! [`InferenceOutcome`] to the next step; [`extract_page`] drives it against
//! a real client and performs the waits.
//!
//! ```text
//!                 Text
//!  Attempting(n) ──────────────────────────────▶ Succeeded(text)
//!       │  ▲
//!       │  │ RateLimited, streak < cap: wait backoff, same n
//!       │  └──────────────────────────
//!       │
//!       │ Transient (or RateLimited streak == cap)
//!       ├── n < max:  wait, Attempting(n + 1)
//!       └── n == max: ──────────────────────────▶ Exhausted(last error)
//! ```
//!
//! A rate limit is a pacing signal, not a page defect, so a single 429 does
//! not spend the attempt budget. An unbroken streak of
//! `max_consecutive_rate_limits` 429s is counted as one failed attempt,
//! which bounds how long a persistently throttled page can hold the run.

use crate::config::{ExtractionConfig, MIN_RATE_LIMIT_BACKOFF_SECS};
use crate::error::PageError;
use crate::pipeline::client::{InferenceClient, InferenceOutcome};
use crate::pipeline::encode::EncodedPage;
use crate::progress::ExtractionProgressCallback;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Retry parameters, derived from [`ExtractionConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub timeout_retry_delay: Duration,
    pub rate_limit_backoff: Duration,
    pub max_consecutive_rate_limits: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            timeout_retry_delay: Duration::from_secs(config.timeout_retry_delay_secs),
            rate_limit_backoff: Duration::from_secs(
                config
                    .rate_limit_backoff_secs
                    .max(MIN_RATE_LIMIT_BACKOFF_SECS),
            ),
            max_consecutive_rate_limits: config.max_consecutive_rate_limits.max(1),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

/// Where a page is in its extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    /// About to send request number `attempt` (1-indexed); `rate_limited`
    /// counts the current unbroken run of 429s.
    Attempting { attempt: u32, rate_limited: u32 },
    Succeeded(String),
    Exhausted { attempts: u32, last_error: String },
}

impl PageState {
    pub fn initial() -> Self {
        PageState::Attempting {
            attempt: 1,
            rate_limited: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PageState::Attempting { .. })
    }
}

/// Why the pipeline is sleeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    RateLimited,
    TransientError,
    Timeout,
    PagePacing,
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WaitReason::RateLimited => "rate limited",
            WaitReason::TransientError => "transient error",
            WaitReason::Timeout => "request timed out",
            WaitReason::PagePacing => "pacing between pages",
        };
        f.write_str(s)
    }
}

/// The next step after an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Sleep `delay`, then continue from `next`.
    Wait {
        delay: Duration,
        reason: WaitReason,
        next: PageState,
    },
    /// The page reached a terminal state.
    Done(PageState),
}

/// Advance `state` by one inference `outcome`.
///
/// Terminal states are returned unchanged.
pub fn transition(state: PageState, outcome: InferenceOutcome, policy: &RetryPolicy) -> Transition {
    let (attempt, rate_limited) = match state {
        PageState::Attempting {
            attempt,
            rate_limited,
        } => (attempt, rate_limited),
        terminal => return Transition::Done(terminal),
    };

    match outcome {
        InferenceOutcome::Text(text) => Transition::Done(PageState::Succeeded(text)),

        InferenceOutcome::Fatal { detail } => Transition::Done(PageState::Exhausted {
            attempts: attempt,
            last_error: detail,
        }),

        InferenceOutcome::RateLimited { detail } => {
            let streak = rate_limited + 1;
            if streak < policy.max_consecutive_rate_limits {
                Transition::Wait {
                    delay: policy.rate_limit_backoff,
                    reason: WaitReason::RateLimited,
                    next: PageState::Attempting {
                        attempt,
                        rate_limited: streak,
                    },
                }
            } else {
                spend_attempt(
                    attempt,
                    format!("rate limited {} times in a row ({})", streak, detail),
                    policy.rate_limit_backoff,
                    WaitReason::RateLimited,
                    policy,
                )
            }
        }

        InferenceOutcome::Transient { detail, timed_out } => {
            let (delay, reason) = if timed_out {
                (policy.timeout_retry_delay, WaitReason::Timeout)
            } else {
                (policy.retry_delay, WaitReason::TransientError)
            };
            spend_attempt(attempt, detail, delay, reason, policy)
        }
    }
}

fn spend_attempt(
    attempt: u32,
    error: String,
    delay: Duration,
    reason: WaitReason,
    policy: &RetryPolicy,
) -> Transition {
    if attempt < policy.max_attempts {
        Transition::Wait {
            delay,
            reason,
            next: PageState::Attempting {
                attempt: attempt + 1,
                rate_limited: 0,
            },
        }
    } else {
        Transition::Done(PageState::Exhausted {
            attempts: attempt,
            last_error: error,
        })
    }
}

/// Run the state machine for one page until it is terminal.
///
/// Returns the extracted text, or [`PageError::Exhausted`] with the last
/// failure once the attempt budget is spent.
pub async fn extract_page(
    client: &dyn InferenceClient,
    page: &EncodedPage,
    policy: &RetryPolicy,
    progress: &dyn ExtractionProgressCallback,
) -> Result<String, PageError> {
    let mut state = PageState::initial();

    loop {
        let attempt = match state {
            PageState::Attempting { attempt, .. } => attempt,
            PageState::Succeeded(text) => return Ok(text),
            PageState::Exhausted {
                attempts,
                last_error,
            } => {
                return Err(PageError::Exhausted {
                    page: page.page_num,
                    attempts,
                    detail: last_error,
                })
            }
        };

        info!(
            "Page {}: calling model (attempt {}/{})",
            page.page_num, attempt, policy.max_attempts
        );
        progress.on_attempt(page.page_num, attempt, policy.max_attempts);

        let outcome = client.transcribe(page).await;
        match &outcome {
            InferenceOutcome::RateLimited { detail } => {
                warn!("Page {}: rate limited ({})", page.page_num, detail)
            }
            InferenceOutcome::Transient { detail, .. } | InferenceOutcome::Fatal { detail } => {
                warn!("Page {}: attempt {} failed: {}", page.page_num, attempt, detail)
            }
            InferenceOutcome::Text(_) => {}
        }

        state = match transition(state, outcome, policy) {
            Transition::Done(terminal) => terminal,
            Transition::Wait {
                delay,
                reason,
                next,
            } => {
                warn!(
                    "Page {}: {}, waiting {}s before retrying",
                    page.page_num,
                    reason,
                    delay.as_secs()
                );
                progress.on_wait(page.page_num, reason, delay);
                sleep(delay).await;
                next
            }
        };
    }
}
