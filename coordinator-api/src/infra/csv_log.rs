// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::domain::holders::HolderSnapshot;
use chrono::Utc;
use itertools::Itertools;
use std::{
    fmt::Write as _,
    fs, io,
    path::{Path, PathBuf},
};

/// Write a CSV snapshot of the holder balances under `dir`, one file per refresh.
pub fn write_holders_csv(dir: &Path, snapshot: &HolderSnapshot) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let path = dir.join(format!("holders_{}.csv", Utc::now().format("%Y%m%d%H%M%S")));

    let mut out = String::from("hotkey,alpha_raw,tao_raw\n");
    for (hotkey, balances) in snapshot.balances.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
        let _ = writeln!(out, "{hotkey},{},{}", balances.alpha_raw, balances.tao_raw);
    }

    fs::write(&path, out)?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::holders::HolderBalances;
    use std::collections::HashMap;

    #[test]
    fn test_write_holders_csv() {
        let dir = tempfile::tempdir().expect("tempdir can be created");
        let snapshot = HolderSnapshot::new(HashMap::from([
            (
                "b-voter".to_owned(),
                HolderBalances {
                    alpha_raw: 2,
                    tao_raw: 20,
                },
            ),
            (
                "a-voter".to_owned(),
                HolderBalances {
                    alpha_raw: 1,
                    tao_raw: 10,
                },
            ),
        ]));

        let path = write_holders_csv(dir.path(), &snapshot).expect("CSV can be written");
        let content = fs::read_to_string(path).expect("CSV can be read");

        assert_eq!(
            content,
            "hotkey,alpha_raw,tao_raw\na-voter,1,10\nb-voter,2,20\n"
        );
    }
}
