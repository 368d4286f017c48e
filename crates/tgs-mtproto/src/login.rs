//! Interactive first-time login. Run once to produce the session file the
//! server reuses.

use grammers_client::SignInError;
use tgs_core::{errors::Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::MtprotoConnector;

/// Prompt for phone, code and (if set) the 2FA password, then save the session.
///
/// Returns the display name of the account that signed in.
pub async fn interactive(connector: &MtprotoConnector) -> Result<String> {
    let client = connector
        .open()
        .await
        .map_err(|e| Error::External(e.to_string()))?;

    let authorized = client
        .is_authorized()
        .await
        .map_err(|e| Error::External(e.to_string()))?;

    if !authorized {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();

        let phone = prompt(&mut stdin, "Phone number (international format): ").await?;
        let token = client
            .request_login_code(&phone)
            .await
            .map_err(|e| Error::External(format!("could not request login code: {e}")))?;

        let code = prompt(&mut stdin, "Login code: ").await?;
        match client.sign_in(&token, &code).await {
            Ok(_) => {}
            Err(SignInError::PasswordRequired(password_token)) => {
                let hint = password_token.hint().unwrap_or("none").to_string();
                let password = prompt(&mut stdin, &format!("2FA password (hint: {hint}): ")).await?;
                client
                    .check_password(password_token, password.as_bytes())
                    .await
                    .map_err(|e| Error::External(format!("2FA check failed: {e}")))?;
            }
            Err(e) => return Err(Error::External(format!("sign in failed: {e}"))),
        }
    }

    client
        .session()
        .save_to_file(connector.session_file())?;

    let me = client
        .get_me()
        .await
        .map_err(|e| Error::External(e.to_string()))?;
    let name = match me.username() {
        Some(u) => format!("@{u}"),
        None => me.full_name(),
    };
    tracing::info!(account = %name, "session saved");
    Ok(name)
}

async fn prompt<R>(lines: &mut tokio::io::Lines<R>, label: &str) -> Result<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut out = tokio::io::stdout();
    out.write_all(label.as_bytes()).await?;
    out.flush().await?;

    match lines.next_line().await? {
        Some(line) if !line.trim().is_empty() => Ok(line.trim().to_string()),
        _ => Err(Error::External(format!("no input for {}", label.trim_end_matches(": ")))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prompt_trims_and_rejects_blank_input() {
        let mut lines = BufReader::new(&b"  +15550100  \n\n"[..]).lines();
        assert_eq!(prompt(&mut lines, "Phone: ").await.unwrap(), "+15550100");

        let err = prompt(&mut lines, "Login code: ").await.unwrap_err();
        assert!(err.to_string().contains("Login code"));
    }
}
