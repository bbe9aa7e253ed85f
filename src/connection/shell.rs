//! File operations expressed as shell commands
//!
//! Used by the SSH backend and by the local backend when elevation is
//! required. Every command goes through [`Connection::run_promise`] so sudo
//! wrapping stays in one place.

use super::error::ConnectionError;
use super::{Connection, FileStat};
use crate::execution::{shell_quote, CommandError, CommandResult, RunOptions};

/// Run `command` hidden and non-fatal, returning the captured result
pub async fn capture<C>(conn: &C, command: &str, sudo: bool) -> Result<CommandResult, ConnectionError>
where
    C: Connection + ?Sized,
{
    let options = RunOptions::probe().with_sudo(sudo);
    let promise = conn
        .run_promise(command, &options)
        .await
        .map_err(|e| flatten(e, command))?;
    promise
        .get_result(true, false)
        .await
        .map_err(|e| flatten(e, command))
}

fn flatten(error: CommandError, command: &str) -> ConnectionError {
    match error {
        CommandError::Connection(e) => e,
        other => ConnectionError::RemoteIo {
            path: command.to_string(),
            reason: other.to_string(),
        },
    }
}

async fn require<C>(conn: &C, command: &str, path: &str, sudo: bool) -> Result<CommandResult, ConnectionError>
where
    C: Connection + ?Sized,
{
    let result = capture(conn, command, sudo).await?;
    if !result.ok() {
        return Err(ConnectionError::RemoteIo {
            path: path.to_string(),
            reason: failure_reason(&result),
        });
    }
    Ok(result)
}

pub fn failure_reason(result: &CommandResult) -> String {
    if result.stderr.is_empty() {
        format!("`{}` exited with {}", result.command, result.return_code)
    } else {
        result.stderr.clone()
    }
}

/// GNU stat first, BSD stat as a fallback; both print `mode size uid gid atime`
pub fn stat_command(path: &str) -> String {
    let path = shell_quote(path);
    format!(
        "stat -L -c '%f %s %u %g %X' -- {path} 2>/dev/null || stat -L -f '%Xp %z %u %g %a' -- {path}"
    )
}

/// Parse the output of [`stat_command`]; the mode is hexadecimal
pub fn parse_stat(output: &str) -> Option<FileStat> {
    let mut fields = output.split_whitespace();
    let mode = u32::from_str_radix(fields.next()?, 16).ok()?;
    let size = fields.next()?.parse().ok()?;
    let uid = fields.next()?.parse().ok()?;
    let gid = fields.next()?.parse().ok()?;
    let atime = fields.next()?.parse().ok()?;

    Some(FileStat {
        mode,
        size,
        uid,
        gid,
        atime,
    })
}

pub fn checksum_command(path: &str) -> String {
    let path = shell_quote(path);
    format!("sha256sum -- {path} 2>/dev/null || shasum -a 256 -- {path}")
}

/// First token of `sha256sum` output, if it looks like a SHA-256 digest
pub fn parse_checksum(output: &str) -> Option<String> {
    let digest = output.split_whitespace().next()?;
    if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(digest.to_lowercase())
    } else {
        None
    }
}

pub async fn stat<C>(conn: &C, path: &str, sudo: bool) -> Result<Option<FileStat>, ConnectionError>
where
    C: Connection + ?Sized,
{
    let result = capture(conn, &stat_command(path), sudo).await?;
    if !result.ok() {
        return Ok(None);
    }

    parse_stat(&result.stdout)
        .map(Some)
        .ok_or_else(|| ConnectionError::RemoteIo {
            path: path.to_string(),
            reason: format!("unexpected stat output: {}", result.stdout),
        })
}

pub async fn checksum<C>(conn: &C, path: &str, sudo: bool) -> Result<Option<String>, ConnectionError>
where
    C: Connection + ?Sized,
{
    let result = capture(conn, &checksum_command(path), sudo).await?;
    if !result.ok() {
        return Ok(None);
    }
    Ok(parse_checksum(&result.stdout))
}

pub async fn create_dir_all<C>(conn: &C, path: &str, sudo: bool) -> Result<(), ConnectionError>
where
    C: Connection + ?Sized,
{
    let command = format!("mkdir -p -- {}", shell_quote(path));
    require(conn, &command, path, sudo).await.map(drop)
}

pub async fn rename<C>(conn: &C, from: &str, to: &str, sudo: bool) -> Result<(), ConnectionError>
where
    C: Connection + ?Sized,
{
    let command = format!("mv -f -- {} {}", shell_quote(from), shell_quote(to));
    require(conn, &command, to, sudo).await.map(drop)
}

pub async fn remove_file<C>(conn: &C, path: &str, sudo: bool) -> Result<(), ConnectionError>
where
    C: Connection + ?Sized,
{
    let command = format!("rm -f -- {}", shell_quote(path));
    require(conn, &command, path, sudo).await.map(drop)
}

pub async fn chown<C>(conn: &C, path: &str, uid: u32, gid: u32) -> Result<(), ConnectionError>
where
    C: Connection + ?Sized,
{
    let command = format!("chown {uid}:{gid} -- {}", shell_quote(path));
    require(conn, &command, path, true).await.map(drop)
}

/// Uid and gid of the connecting user, without elevation
pub async fn effective_ids<C>(conn: &C) -> Result<(u32, u32), ConnectionError>
where
    C: Connection + ?Sized,
{
    let result = require(conn, "id -u; id -g", "id", false).await?;
    let mut lines = result.stdout.lines().map(str::trim);

    let parse = |value: Option<&str>| -> Result<u32, ConnectionError> {
        value
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| ConnectionError::RemoteIo {
                path: "id".to_string(),
                reason: format!("unexpected id output: {}", result.stdout),
            })
    };

    let uid = parse(lines.next())?;
    let gid = parse(lines.next())?;
    Ok((uid, gid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gnu_stat() {
        let stat = parse_stat("81a4 1024 1000 1000 1700000000").unwrap();
        assert_eq!(stat.mode, 0o100644);
        assert_eq!(stat.size, 1024);
        assert_eq!(stat.uid, 1000);
        assert_eq!(stat.atime, 1_700_000_000);
        assert_eq!(
            stat.accessed().map(|t| t.to_rfc3339()).as_deref(),
            Some("2023-11-14T22:13:20+00:00")
        );
        assert!(stat.is_file());
        assert!(!stat.is_dir());
    }

    #[test]
    fn test_parse_directory_stat() {
        let stat = parse_stat("41ed 4096 0 0 1700000000").unwrap();
        assert!(stat.is_dir());
        assert_eq!(stat.permissions(), 0o755);
    }

    #[test]
    fn test_parse_stat_rejects_garbage() {
        assert!(parse_stat("").is_none());
        assert!(parse_stat("stat: cannot stat").is_none());
        assert!(parse_stat("81a4 12").is_none());
    }

    #[test]
    fn test_parse_checksum() {
        let digest = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(
            parse_checksum(&format!("{digest}  /etc/hosts")).as_deref(),
            Some(digest)
        );
        assert!(parse_checksum("sha256sum: missing").is_none());
    }

    #[test]
    fn test_commands_quote_paths() {
        assert!(stat_command("/srv/my file").contains("-- '/srv/my file'"));
        assert!(checksum_command("/tmp/a").starts_with("sha256sum -- /tmp/a"));
    }
}
