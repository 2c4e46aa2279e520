// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[cfg(test)]
pub(crate) const LOADER_NAME: &str = "loader.name";

#[cfg(test)]
pub(crate) const LOADER_ACTIVITY: &str = "loader.activity";

#[cfg(test)]
pub(crate) const LOADER_KEY_COUNT: &str = "loader.key_count";

#[cfg(test)]
pub(crate) const LOADER_EVENT: &str = "loader.event";
