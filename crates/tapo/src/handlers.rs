use serde_json::Value;
use tapo_core::{ApiClient, ClientConfig, Error};
use tracing::{debug, error};

use crate::cli::Cli;
use crate::utils::{get_credentials, print_json_response};

/// Handle a single device command.
pub async fn handle_device(cli: Cli) {
    let credentials = match get_credentials(cli.username, cli.password, cli.password_stdin) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let (method, params) = match cli.command.to_request() {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let config = ClientConfig::new(&cli.target)
        .with_port(cli.port)
        .with_timeout(cli.timeout)
        .with_credentials(credentials);

    debug!(host = %cli.target, port = cli.port, "connecting");
    let mut client = match ApiClient::connect(config).await {
        Ok(client) => client,
        Err(e) => {
            error!(host = %cli.target, error = %e, "could not connect");
            eprintln!("Error: Could not connect to {}: {}", cli.target, e);
            if matches!(e.root_cause(), Error::AuthenticationFailed(_)) {
                eprintln!();
                eprintln!("Check the account credentials, e.g.:");
                eprintln!("  tapo -u your@email.com {} info", cli.target);
            }
            std::process::exit(1);
        }
    };

    debug!(method, child = ?cli.child, "sending request");
    let response = match &cli.child {
        Some(device_id) => client
            .control_child::<_, Value>(device_id, method, params)
            .await
            .map(|result| result.to_string().into_bytes()),
        None => client.request(method, &params).await,
    };

    match response {
        Ok(response) => print_json_response(&response),
        Err(e) => {
            error!(method, error = %e, "command failed");
            eprintln!("Error: Command failed: {}", e);
            std::process::exit(1);
        }
    }
}
