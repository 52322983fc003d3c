// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `crest hash-password` - digest for `spec.security.users[].password_sha256`

use anyhow::{Context, Result};
use std::io::BufRead;

use crest_core::infrastructure::authenticator::hash_password;

pub fn execute(password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => read_password(std::io::stdin().lock())?,
    };

    println!("{}", hash_password(&password));
    Ok(())
}

fn read_password(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }
    Ok(password)
}
