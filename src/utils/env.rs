// SPDX-License-Identifier: GPL-3.0-only

/// Value of `name`, `None` if unset or not valid UTF-8.
pub fn var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
