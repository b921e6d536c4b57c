//! Local account database via `getent` and the shadow-utils tools.

use super::{shell_escape, Accounts, CommandRunner, GroupInfo, UserInfo, UserRequest};

pub struct ShadowAccounts {
    runner: Box<dyn CommandRunner>,
}

impl ShadowAccounts {
    pub fn new(runner: Box<dyn CommandRunner>) -> Self {
        ShadowAccounts { runner }
    }
}

/// Parse one `getent group` line: `name:x:gid:members`.
pub fn parse_group_entry(line: &str) -> Option<GroupInfo> {
    let fields: Vec<&str> = line.trim().split(':').collect();
    if fields.len() < 3 {
        return None;
    }
    Some(GroupInfo {
        name: fields[0].to_string(),
        gid: fields[2].parse().ok()?,
    })
}

/// Parse one `getent passwd` line: `name:x:uid:gid:gecos:home:shell`.
pub fn parse_passwd_entry(line: &str) -> Option<UserInfo> {
    let fields: Vec<&str> = line.trim().split(':').collect();
    if fields.len() < 7 {
        return None;
    }
    Some(UserInfo {
        name: fields[0].to_string(),
        uid: fields[2].parse().ok()?,
        gid: fields[3].parse().ok()?,
        comment: fields[4].to_string(),
        home: fields[5].to_string(),
        shell: fields[6].to_string(),
    })
}

fn user_flags(request: &UserRequest) -> Vec<String> {
    let mut flags = Vec::new();
    if let Some(uid) = request.uid {
        flags.push(format!("-u {}", uid));
    }
    if let Some(group) = &request.group {
        flags.push(format!("-g {}", shell_escape(group)));
    }
    if let Some(home) = &request.home {
        flags.push(format!("-d {}", shell_escape(home)));
    }
    if let Some(shell) = &request.shell {
        flags.push(format!("-s {}", shell_escape(shell)));
    }
    if let Some(comment) = &request.comment {
        flags.push(format!("-c {}", shell_escape(comment)));
    }
    flags
}

impl Accounts for ShadowAccounts {
    // getent exits 2 for unknown keys; treat any failure as absent.
    fn group(&self, name: &str) -> Result<Option<GroupInfo>, String> {
        Ok(self
            .runner
            .run(&format!("getent group {}", shell_escape(name)))
            .ok()
            .and_then(|out| out.lines().next().and_then(parse_group_entry)))
    }

    fn user(&self, name: &str) -> Result<Option<UserInfo>, String> {
        Ok(self
            .runner
            .run(&format!("getent passwd {}", shell_escape(name)))
            .ok()
            .and_then(|out| out.lines().next().and_then(parse_passwd_entry)))
    }

    fn create_group(&mut self, name: &str, gid: Option<u32>, system: bool) -> Result<(), String> {
        let mut cmd = String::from("groupadd");
        if system {
            cmd.push_str(" -r");
        }
        if let Some(gid) = gid {
            cmd.push_str(&format!(" -g {}", gid));
        }
        cmd.push(' ');
        cmd.push_str(&shell_escape(name));
        self.runner.run(&cmd).map(|_| ())
    }

    fn modify_group(&mut self, name: &str, gid: u32) -> Result<(), String> {
        self.runner
            .run(&format!("groupmod -g {} {}", gid, shell_escape(name)))
            .map(|_| ())
    }

    fn create_user(&mut self, request: &UserRequest) -> Result<(), String> {
        let mut parts = vec!["useradd".to_string()];
        if request.system {
            parts.push("-r".into());
        }
        parts.extend(user_flags(request));
        parts.push(shell_escape(&request.name));
        self.runner.run(&parts.join(" ")).map(|_| ())
    }

    fn modify_user(&mut self, request: &UserRequest) -> Result<(), String> {
        let mut parts = vec!["usermod".to_string()];
        parts.extend(user_flags(request));
        parts.push(shell_escape(&request.name));
        self.runner.run(&parts.join(" ")).map(|_| ())
    }

    fn remove_user(&mut self, name: &str) -> Result<(), String> {
        self.runner
            .run(&format!("userdel {}", shell_escape(name)))
            .map(|_| ())
    }

    fn remove_group(&mut self, name: &str) -> Result<(), String> {
        self.runner
            .run(&format!("groupdel {}", shell_escape(name)))
            .map(|_| ())
    }
}
