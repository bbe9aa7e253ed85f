//! Shell-level command wrapping

/// Apply the working directory prefix and sudo elevation to `command`
///
/// `cwd` is a plain `cd` prefix evaluated by the shell, not an isolated
/// working directory. Sudo runs non-interactively, so a denied elevation
/// surfaces as an ordinary non-zero exit.
pub fn build_command(command: &str, cwd: Option<&str>, use_sudo: bool) -> String {
    let command = match cwd {
        Some(cwd) => format!("cd {}; {}", quote_cwd(cwd), command),
        None => command.to_string(),
    };

    if use_sudo {
        format!("sudo -n -- sh -c \"{}\"", escape_double_quoted(&command))
    } else {
        command
    }
}

/// Quote a single shell word when it needs it
pub fn shell_quote(word: &str) -> String {
    shell_words::quote(word).into_owned()
}

/// Quote a working directory while leaving `~` and `$VAR` to the shell
fn quote_cwd(cwd: &str) -> String {
    if cwd.contains('$') {
        return cwd.to_string();
    }
    match cwd.strip_prefix('~') {
        Some(rest) => {
            let (user, path) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
            if path.is_empty() {
                format!("~{user}")
            } else {
                format!("~{user}{}", shell_quote(path))
            }
        }
        None => shell_quote(cwd),
    }
}

fn escape_double_quoted(command: &str) -> String {
    let mut escaped = String::with_capacity(command.len());
    for c in command.chars() {
        if matches!(c, '\\' | '"') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
