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

use std::fs;
use std::io;
use std::path::PathBuf;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use crossbeam_channel::RecvError;

/// Removes expired log files off the write path.
///
/// Each message is one sweep's worth of paths. Removal errors are ignored; the files are picked
/// up again by the next sweep if they still match.
pub(crate) struct Worker {
    receiver: Receiver<Vec<PathBuf>>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum WorkerState {
    Continue,
    Disconnected,
}

impl Worker {
    pub(crate) fn new(receiver: Receiver<Vec<PathBuf>>) -> Worker {
        Self { receiver }
    }

    fn work(&mut self) -> WorkerState {
        match self.receiver.recv() {
            Ok(paths) => {
                for path in paths {
                    let _ = fs::remove_file(path);
                }
                WorkerState::Continue
            }
            Err(RecvError) => WorkerState::Disconnected,
        }
    }

    pub(crate) fn make_thread(mut self, name: String) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new().name(name).spawn(move || {
            while self.work() == WorkerState::Continue {}
        })
    }
}
