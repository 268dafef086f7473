// Vanish Ephemeral Paste Hosting
// Copyright (C) 2021  Edward Shen
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use vanish_common::Url;

use crate::reader::ViewLimit;

#[derive(Parser, Debug)]
#[clap(version, about = "Serves pastes that expire by time or by view count")]
pub struct Opts {
    /// Address to listen on.
    #[clap(long, env = "VANISH_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,
    /// Public address of this instance, used to build paste links.
    #[clap(long, env = "VANISH_BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: Url,
    /// Where pastes are kept.
    #[clap(long, env = "VANISH_STORE", value_enum, default_value = "rocksdb")]
    pub store: Backend,
    /// RocksDB directory, for the `rocksdb` store.
    #[clap(long, env = "VANISH_DB_PATH", default_value = "database")]
    pub db_path: PathBuf,
    /// Never deliver a paste past its view limit, even to concurrent readers.
    #[clap(long, env = "VANISH_STRICT_VIEW_LIMIT")]
    pub strict_view_limit: bool,
    /// Let requests override the clock with an `x-test-now-ms` header.
    #[clap(long, env = "TEST_MODE")]
    pub test_mode: bool,
}

impl Opts {
    pub const fn view_limit(&self) -> ViewLimit {
        if self.strict_view_limit {
            ViewLimit::Strict
        } else {
            ViewLimit::Loose
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// In-process map; pastes are lost on restart.
    Memory,
    /// On-disk RocksDB database.
    Rocksdb,
}
