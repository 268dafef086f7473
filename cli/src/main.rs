#![warn(clippy::nursery, clippy::pedantic)]
#![deny(unsafe_code)]

// Vanish CLI Client
// Copyright (C) 2021  Edward Shen
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use atty::Stream;
use clap::Parser;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use vanish_common::{
    create_url, CreatePaste, CreatedPaste, ErrorBody, Gone, PasteUrl, PasteView, Url,
};

#[derive(Parser)]
#[clap(version, about = "Share text that disappears")]
struct Opts {
    #[clap(subcommand)]
    action: Action,
}

#[derive(Parser)]
enum Action {
    /// Create a paste and print its link.
    Create {
        /// The Vanish instance to create the paste on.
        url: Url,
        /// Delete the paste this many seconds after creation (at most 7 days).
        #[clap(short, long)]
        ttl: Option<i64>,
        /// Delete the paste after it has been read this many times (at most 100).
        #[clap(short, long)]
        max_views: Option<i64>,
        /// File to share. Reads stdin when omitted.
        path: Option<PathBuf>,
    },
    /// Read a paste, using up one of its views.
    Read {
        /// The paste link, as printed by `create`.
        url: PasteUrl,
    },
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    match opts.action {
        Action::Create {
            url,
            ttl,
            max_views,
            path,
        } => handle_create(&url, ttl, max_views, path),
        Action::Read { url } => handle_read(&url),
    }?;

    Ok(())
}

fn handle_create(
    url: &Url,
    ttl: Option<i64>,
    max_views: Option<i64>,
    path: Option<PathBuf>,
) -> Result<()> {
    let content = if let Some(path) = path {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        if atty::is(Stream::Stdin) {
            bail!("Nothing to share. Pass a file or pipe the text into stdin.");
        }
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read stdin")?;
        content
    };

    let request = CreatePaste {
        content,
        ttl_seconds: ttl,
        max_views,
    };

    let res = Client::new()
        .post(create_url(url))
        .json(&request)
        .send()
        .context("Request to server failed")?;

    if res.status() != StatusCode::CREATED {
        bail!("Upload failed. {}", failure(res));
    }

    let created: CreatedPaste = res.json().context("Server sent a malformed reply")?;
    println!("{}", created.url);

    Ok(())
}

fn handle_read(url: &PasteUrl) -> Result<()> {
    let res = Client::new()
        .get(url.api_url())
        .send()
        .context("Failed to get data")?;

    if res.status() != StatusCode::OK {
        bail!("{}", failure(res));
    }

    let view: PasteView = res.json().context("Server sent a malformed reply")?;

    std::io::stdout().write_all(view.content.as_bytes())?;
    // Keep the shell prompt off the last line of the paste
    if atty::is(Stream::Stdout) && !view.content.ends_with('\n') {
        println!();
    }

    eprintln!("{}", view.limits);

    Ok(())
}

fn failure(res: Response) -> String {
    let status = res.status();
    let body = res.text().unwrap_or_default();
    describe_failure(status, &body)
}

/// Turns an error response into something worth showing a person.
fn describe_failure(status: StatusCode, body: &str) -> String {
    match error_message(body) {
        Some(error) => match error.parse::<Gone>() {
            Ok(gone) => gone.to_string(),
            Err(()) => format!("Server said: {} (HTTP {})", error, status),
        },
        None => format!("Got HTTP error {}", status),
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|body| body.error)
}
