// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

/// Boxed error, e.g. to be used as source in "source chains".
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
