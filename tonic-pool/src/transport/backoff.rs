/*
 *
 * Copyright 2025 gRPC authors.
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to
 * deal in the Software without restriction, including without limitation the
 * rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
 * sell copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in
 * all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
 * FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
 * IN THE SOFTWARE.
 *
 */

use std::time::Duration;

use rand::Rng;

/// Controls how long a connection waits after a failed dial before it is
/// allowed to dial again.
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// The amount of time to back off after the first failure.
    pub base_delay: Duration,

    /// The factor with which to multiply backoffs after a failed retry.
    /// Must be at least 1.
    pub multiplier: f64,

    /// The factor with which backoffs are randomized, between 0 and 1.
    pub jitter: f64,

    /// The upper bound of backoff delay.
    pub max_delay: Duration,
}

/// The default values from
/// <https://github.com/grpc/grpc/blob/master/doc/connection-backoff.md>.
pub(crate) const DEFAULT_EXPONENTIAL_CONFIG: BackoffConfig = BackoffConfig {
    base_delay: Duration::from_secs(1),
    multiplier: 1.6,
    jitter: 0.2,
    max_delay: Duration::from_secs(120),
};

impl Default for BackoffConfig {
    fn default() -> Self {
        DEFAULT_EXPONENTIAL_CONFIG
    }
}

impl BackoffConfig {
    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if self.base_delay > self.max_delay {
            return Err("base_delay must not be greater than max_delay");
        }
        if self.multiplier < 1.0 {
            return Err("multiplier must be at least 1.0");
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("jitter must be between 0 and 1");
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct ExponentialBackoff {
    config: BackoffConfig,

    // Next delay before jitter; kept as f64 to avoid rounding drift.
    next_delay_secs: f64,
}

impl ExponentialBackoff {
    /// `config` must have passed `BackoffConfig::validate`.
    pub(crate) fn new(config: BackoffConfig) -> Self {
        let next_delay_secs = config.base_delay.as_secs_f64();
        ExponentialBackoff {
            config,
            next_delay_secs,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.next_delay_secs = self.config.base_delay.as_secs_f64();
    }

    pub(crate) fn backoff_duration(&mut self) -> Duration {
        let next_delay = self.next_delay_secs;
        let jitter = if self.config.jitter > 0.0 {
            self.config.jitter * rand::rng().random_range(-1.0..1.0)
        } else {
            0.0
        };
        self.next_delay_secs = self
            .config
            .max_delay
            .as_secs_f64()
            .min(next_delay * self.config.multiplier);
        Duration::from_secs_f64(next_delay * (1.0 + jitter))
    }
}
