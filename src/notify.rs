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

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use crossbeam_channel::bounded;

/// The publishing half of the rotation notification channel.
///
/// The channel holds at most one pending filename. Publishing never blocks: when the slot is
/// already taken, i.e., no consumer has picked up the previous event, the new event is dropped.
#[derive(Debug)]
pub(crate) struct RotationNotifier {
    sender: Sender<PathBuf>,
    receiver: Receiver<PathBuf>,
}

impl RotationNotifier {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = bounded(1);
        Self { sender, receiver }
    }

    /// Publish `filename` if the slot is free. Return whether it was queued.
    pub(crate) fn try_publish(&self, filename: PathBuf) -> bool {
        self.sender.try_send(filename).is_ok()
    }

    pub(crate) fn subscribe(&self) -> RotationEvents {
        RotationEvents {
            receiver: self.receiver.clone(),
        }
    }
}

/// The receiving half of the rotation notification channel.
///
/// Each value is the filename that became active after a rotation. Delivery is best-effort:
/// while one event is pending, later rotations are not queued. All clones share the same slot,
/// so each event is received by exactly one of them.
///
/// Once the writer is dropped and the pending event, if any, is taken, receiving returns `None`.
#[derive(Debug, Clone)]
pub struct RotationEvents {
    receiver: Receiver<PathBuf>,
}

impl RotationEvents {
    /// Block until a rotation event is available.
    pub fn recv(&self) -> Option<PathBuf> {
        self.receiver.recv().ok()
    }

    /// Take the pending rotation event, if any.
    pub fn try_recv(&self) -> Option<PathBuf> {
        self.receiver.try_recv().ok()
    }

    /// Wait for a rotation event for at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PathBuf> {
        self.receiver.recv_timeout(timeout).ok()
    }
}
