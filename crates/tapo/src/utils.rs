use std::io::IsTerminal;

use tapo_core::Credentials;

/// Read password securely based on the provided options.
///
/// # Priority
///
/// 1. If `password` was provided (`TAPO_PASSWORD`), use it
/// 2. If `password_stdin` is true, read from stdin
/// 3. Otherwise, prompt interactively (if terminal is available)
pub fn read_password(
    password_stdin: bool,
    password: Option<String>,
    prompt: &str,
) -> Result<String, String> {
    if let Some(pass) = password {
        return Ok(pass);
    }

    if password_stdin {
        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(|e| format!("Failed to read password from stdin: {}", e))?;
        return Ok(input.trim().to_string());
    }

    if std::io::stdin().is_terminal() {
        eprint!("{}: ", prompt);
        rpassword::read_password().map_err(|e| format!("Failed to read password: {}", e))
    } else {
        Err("No password provided. Use --password-stdin when piping input.".to_string())
    }
}

/// Get credentials from CLI options and environment.
///
/// Without a username the blank credentials are used, which unprovisioned
/// devices accept.
pub fn get_credentials(
    username: Option<String>,
    password: Option<String>,
    password_stdin: bool,
) -> Result<Credentials, String> {
    let Some(user) = username else {
        return Ok(Credentials::blank());
    };

    let prompt = format!("Password for {}", user);
    let pass = read_password(password_stdin, password, &prompt)?;
    Ok(Credentials::new(user, pass))
}

/// Print a response body as compact JSON, or verbatim if it is not JSON.
pub fn print_json_response(response: &[u8]) {
    match serde_json::from_slice::<serde_json::Value>(response) {
        Ok(json) => println!("{}", json),
        Err(_) => println!("{}", String::from_utf8_lossy(response)),
    }
}
