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

use clap::Parser;

fn main() {
    let opts = sriov_extender::ExtenderOpts::parse();

    sriov_rt::init_sriov_logger(sriov_rt::LoggerSettings::new_default());

    if let Err(err) = sriov_rt::main_okk(sriov_extender::start(opts)) {
        tracing::error!(error = %err, "extender failed");
        std::process::exit(1);
    }
}
