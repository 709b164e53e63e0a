// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Rotate a log on demand, the way a `SIGHUP` handler would, and watch the rotation events.

use std::io::Write;
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use rotatelog::RotateLog;

fn main() {
    let dir = std::env::temp_dir().join("rotatelog_demo");
    let _ = std::fs::remove_dir_all(&dir);

    let log = RotateLog::builder(dir.join("app.%Y%m%d.log").display().to_string())
        .max_count(NonZeroUsize::new(3).unwrap())
        .link_name(dir.join("app.log"))
        .build()
        .unwrap();

    let events = log.rotation_events();
    let watcher = thread::spawn(move || {
        while let Some(filename) = events.recv_timeout(Duration::from_secs(1)) {
            println!("now writing to {}", filename.display());
        }
    });

    let mut writer = &log;
    for i in 0..5 {
        writeln!(writer, "before rotation {i}").unwrap();
        log.rotate().unwrap();
        // the notification slot holds a single event; let the watcher drain it
        thread::sleep(Duration::from_millis(50));
    }

    log.close().unwrap();
    drop(log);
    watcher.join().unwrap();

    let mut files = std::fs::read_dir(&dir)
        .unwrap()
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect::<Vec<_>>();
    files.sort();
    println!("files in {}: {files:?}", dir.display());
}
