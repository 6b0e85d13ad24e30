// Copyright 2025 RustFS Team
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

use clap::{Parser, Subcommand};
use ocs_provider::config::ServerArgs;

#[derive(Parser)]
#[command(name = "ocs-provider")]
#[command(about = "Storage consumer provider operator", long_about = None)]
#[command(version = ocs_provider::build::PKG_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Output CRDs in YAML
    Crd {
        /// Optional output path. If not set, the output will be written to stdout.
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Issue an onboarding ticket
    Ticket {
        /// Name the ticket is issued for.
        subject: String,

        /// Capacity the consumer may request, e.g. 500Gi.
        #[arg(long)]
        quota: Option<String>,

        #[arg(long, default_value_t = 48)]
        ttl_hours: i64,

        #[arg(long, env = "ONBOARDING_TICKET_SECRET", hide_env_values = true)]
        ticket_secret: String,
    },

    /// Run the controllers and the provider API
    Server(ServerArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crd { file } => ocs_provider::crd(file).await?,
        Commands::Ticket {
            subject,
            quota,
            ttl_hours,
            ticket_secret,
        } => {
            let ticket =
                ocs_provider::ticket(&ticket_secret, &subject, quota.as_deref(), ttl_hours)?;
            println!("{ticket}");
        }
        Commands::Server(args) => ocs_provider::run(args).await?,
    }

    Ok(())
}
