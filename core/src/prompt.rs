//! Expected rendering of `PS1` templates.
//!
//! Supported escapes are `\u` (user name), `\h` (host name) and `\w` (working
//! directory). Any other backslash sequence is kept as written.

use std::path::Path;

use anyhow::Context as _;
use nix::unistd::{gethostname, Uid, User};

/// Values substituted into a prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptEnv {
    pub user: String,
    pub host: String,
}

impl PromptEnv {
    /// Looks up the current user and host the way a login shell would see them.
    pub fn current() -> anyhow::Result<Self> {
        Ok(Self {
            user: current_user()?,
            host: gethostname()
                .context("Cannot determine host name")?
                .to_string_lossy()
                .into_owned(),
        })
    }

    pub fn expand(&self, template: &str, cwd: &Path) -> String {
        let cwd = cwd.to_string_lossy();
        let mut out = String::with_capacity(template.len() + 32);
        let mut chars = template.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('u') => out.push_str(&self.user),
                Some('h') => out.push_str(&self.host),
                Some('w') => out.push_str(&cwd),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        }
        out
    }
}

pub fn mentions_cwd(template: &str) -> bool {
    template.contains("\\w")
}

fn current_user() -> anyhow::Result<String> {
    for var in ["LOGNAME", "USER", "LNAME", "USERNAME"] {
        match std::env::var(var) {
            Ok(name) if !name.is_empty() => return Ok(name),
            _ => {}
        }
    }
    let uid = Uid::current();
    let user = User::from_uid(uid)
        .context("Cannot read the password database")?
        .with_context(|| format!("No user with uid {}", uid))?;
    Ok(user.name)
}

#[cfg(test)]
mod test {
    use super::*;

    fn env() -> PromptEnv {
        PromptEnv {
            user: "alice".into(),
            host: "lab-07".into(),
        }
    }

    #[test]
    fn expands_all_escapes() {
        let cwd = Path::new("/home/alice");
        assert_eq!(env().expand("u=\\u $", cwd), "u=alice $");
        assert_eq!(env().expand("h=\\h $", cwd), "h=lab-07 $");
        assert_eq!(env().expand("w=\\w $", cwd), "w=/home/alice $");
        assert_eq!(
            env().expand("u=\\u h=\\h w=\\w $", Path::new("/")),
            "u=alice h=lab-07 w=/ $"
        );
    }

    #[test]
    fn unknown_escapes_are_kept() {
        assert_eq!(env().expand("\\t\\u\\", Path::new("/")), "\\talice\\");
    }

    #[test]
    fn cwd_detection() {
        assert!(mentions_cwd("w=\\w $"));
        assert!(!mentions_cwd("u=\\u $"));
    }

    #[test]
    fn current_env_is_resolvable() {
        let env = dbg!(PromptEnv::current()).unwrap();
        assert!(!env.user.is_empty());
        assert!(!env.host.is_empty());
    }
}
