// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Rebuilds a shell-executable command line from the argv of a running
//! process.

use serde::{Deserialize, Serialize};

use crate::procfs::Cmdline;

/// One flag with its (possibly empty) value, or a positional argument with an
/// empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagArgument {
    pub flag: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgToken {
    /// A token starting with `-` together with every non-flag token that
    /// follows it, joined with single spaces.
    Flag { flag: String, value: String },
    /// A non-flag token not owned by any flag.
    Standalone(String),
}

impl From<ArgToken> for FlagArgument {
    fn from(token: ArgToken) -> Self {
        match token {
            ArgToken::Flag { flag, value } => FlagArgument { flag, value },
            ArgToken::Standalone(flag) => FlagArgument {
                flag,
                value: String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstructed {
    pub command: String,
    pub arguments: Vec<FlagArgument>,
}

pub fn reconstruct(executable: &str, cmdline: &Cmdline) -> Reconstructed {
    let args: Vec<&str> = cmdline.args().collect();
    let tokens = tokenize(&invocation_args(executable, &args));
    let command = render(executable, &tokens);

    Reconstructed {
        command,
        arguments: tokens.into_iter().map(FlagArgument::from).collect(),
    }
}

/// Arguments passed to the executable, without the executable itself.
///
/// The invocation starts at the first argument equal to the executable path.
/// Daemons may rewrite argv[0] into a banner such as
/// `nginx: master process /usr/sbin/nginx`, in which case the words after the
/// path in the banner are kept. Without either match argv[0] is taken as the
/// command.
fn invocation_args<'a>(executable: &str, args: &[&'a str]) -> Vec<&'a str> {
    if let Some(pos) = args.iter().position(|arg| *arg == executable) {
        return args.iter().skip(pos + 1).copied().collect();
    }

    let rest = args.iter().skip(1).copied();
    if let Some(&banner) = args.first() {
        let mut words = banner.split_whitespace();
        if words.any(|word| word == executable) {
            return words.chain(rest).collect();
        }
    }

    rest.collect()
}

fn is_flag(arg: &str) -> bool {
    arg.starts_with('-')
}

pub fn tokenize(args: &[&str]) -> Vec<ArgToken> {
    let mut tokens = Vec::new();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        if is_flag(arg) {
            let mut value = Vec::new();
            while let Some(next) = iter.next_if(|next| !is_flag(next)) {
                value.push(*next);
            }
            tokens.push(ArgToken::Flag {
                flag: arg.to_string(),
                value: value.join(" "),
            });
        } else {
            tokens.push(ArgToken::Standalone(arg.to_string()));
        }
    }

    tokens
}

/// True when `value` holds a character outside `[A-Za-z0-9_@%+=:,./-]`.
pub fn needs_quoting(value: &str) -> bool {
    value
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c)))
}

fn quote(value: &str) -> String {
    if !value.is_empty() && !needs_quoting(value) {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn render(executable: &str, tokens: &[ArgToken]) -> String {
    let mut parts = vec![quote(executable)];

    for token in tokens {
        match token {
            ArgToken::Flag { flag, value } => {
                parts.push(quote(flag));
                if !value.is_empty() {
                    parts.push(quote(value));
                }
            }
            ArgToken::Standalone(arg) => parts.push(quote(arg)),
        }
    }

    parts.join(" ")
}
