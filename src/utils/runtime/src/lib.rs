// Copyright 2025 The SR-IOV Scheduler Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configures the scheduler-extender binaries, including logging, panic
//! handling and the tokio runtime.

use futures::Future;
use tracing::Level;
use tracing_subscriber::filter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;

pub struct LoggerSettings {
    /// Enable colorful output in console.
    colorful: bool,
}

impl LoggerSettings {
    pub fn new_default() -> Self {
        Self {
            colorful: console::colors_enabled_stderr(),
        }
    }
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self::new_default()
    }
}

/// Set panic hook to abort the process (without losing debug info and stack trace).
pub fn set_panic_abort() {
    use std::panic;

    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        default_hook(info);
        std::process::abort();
    }));
}

/// Init logger for the extender and discovery binaries. Everything goes to
/// standard error so the scheduler's stdout stays clean.
pub fn init_sriov_logger(settings: LoggerSettings) {
    let fmt_layer = {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(settings.colorful)
            .with_writer(std::io::stderr);

        let filter = filter::Targets::new()
            // Only enable WARN and ERROR for 3rd-party crates
            .with_target("hyper", Level::WARN)
            .with_target("tower", Level::WARN)
            .with_target("kube_client", Level::WARN)
            .with_target("sriov_extender", Level::DEBUG)
            .with_target("sriov_discovery", Level::INFO)
            .with_target("sriov_common", Level::INFO)
            .with_default(Level::INFO);

        fmt_layer.with_filter(filter)
    };

    tracing_subscriber::registry().with(fmt_layer).init();
}

/// Run a binary's main future on a fresh multi-threaded runtime.
///
/// `SRIOV_WORKER_THREADS` overrides the number of tokio worker threads; the
/// default is tokio's (one per CPU core).
pub fn main_okk<F>(f: F) -> F::Output
where
    F: Future + Send + 'static,
{
    set_panic_abort();

    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Ok(worker_threads) = std::env::var("SRIOV_WORKER_THREADS") {
        let worker_threads = worker_threads.parse().unwrap();
        tracing::info!("setting tokio worker threads to {}", worker_threads);
        builder.worker_threads(worker_threads);
    }

    builder.enable_all().build().unwrap().block_on(f)
}
