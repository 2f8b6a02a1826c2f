/*
    MartyPC
    https://github.com/dbalsom/martypc

    Copyright 2022-2024 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    config.rs

    Per-device configuration definitions. Parsing a host TOML/config file
    into these structs is a host concern and out of scope here; only the
    typed data and its defaults live in this crate.
*/

use serde_derive::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct ReaderConfig {
    pub da: u16,
    pub deck: Option<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig { da: 0x00C, deck: None }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum LineKind {
    Async,
    Bsc,
}

/// Whether a line observes the dial-up enable/poll handshake or is a
/// hard-wired direct connection (§3 `dialup`, §4.4 step 1).
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum LineMode {
    Dialup,
    Direct,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LineConfig {
    pub da: u16,
    #[serde(rename = "type")]
    pub kind: LineKind,
    pub mode: LineMode,
    pub port: Option<u16>,
}

impl LineConfig {
    pub fn default_async(index: u16) -> Self {
        LineConfig {
            da: 0x030 + index,
            kind: LineKind::Async,
            mode: LineMode::Dialup,
            port: None,
        }
    }

    pub fn default_bsc(index: u16) -> Self {
        LineConfig {
            da: 0x030 + index,
            kind: LineKind::Bsc,
            mode: LineMode::Direct,
            port: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CommControllerConfig {
    pub line: Vec<LineConfig>,
    /// BSC read-command wall-clock timeout, in milliseconds. `None` disables
    /// it (§5 Timeouts: compiled out upstream, made an explicit policy here).
    pub bsc_read_timeout_ms: Option<u64>,
}
