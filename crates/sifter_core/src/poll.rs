//! Job lifecycle: creation, supersession, polling, result fetch, cancellation.

use crate::{
    CreatedJob, Effect, JobResult, JobSpec, JobStatus, Patch, PollOutcome, PollPhase, RequestId,
    SifterState, StatusReply, WireStatus,
};

const SUBMITTING_MESSAGE: &str = "Submitting job";

/// Quiet intervals a restored context waits before polling a job itself.
pub const STANDBY_QUIET_TICKS: u32 = 2;

impl SifterState {
    pub(crate) fn start_job(&mut self, effects: &mut Vec<Effect>) {
        let supersedes = match &self.snapshot().job {
            job if job.is_running() => job.request_id.clone(),
            _ => None,
        };
        if supersedes.is_some() {
            self.cancel_locally(effects);
        } else {
            self.stop_polling(PollOutcome::Released, effects);
        }

        // Any creation or fetch still in flight belongs to an older attempt now.
        self.job_generation += 1;
        self.fetch_pending = None;
        let spec = JobSpec::from(&self.snapshot().filters);
        self.commit(
            Patch {
                request_id: Some(None),
                job_status: Some(None),
                progress: Some(0.0),
                message: Some(SUBMITTING_MESSAGE.to_string()),
                job_result: Some(None),
                job_loading: Some(true),
                job_error: Some(None),
                ..Patch::default()
            },
            effects,
        );
        effects.push(Effect::CreateJob {
            generation: self.job_generation,
            spec,
            supersedes,
        });
    }

    pub(crate) fn cancel_job(&mut self, effects: &mut Vec<Effect>) {
        let job = &self.snapshot().job;
        if job.is_running() {
            if let Some(request_id) = job.request_id.clone() {
                effects.push(Effect::CancelJob { request_id });
                self.cancel_locally(effects);
            }
        } else if job.request_id.is_none() && job.loading {
            // Creation still outstanding: orphan it so it is cancelled on arrival.
            self.job_generation += 1;
            self.cancel_locally(effects);
        }
    }

    pub(crate) fn job_created(
        &mut self,
        generation: u64,
        result: Result<CreatedJob, String>,
        effects: &mut Vec<Effect>,
    ) {
        if generation != self.job_generation {
            if let Ok(created) = result {
                effects.push(Effect::CancelJob {
                    request_id: created.request_id,
                });
            }
            return;
        }

        match result {
            Err(err) => self.commit(
                Patch {
                    job_loading: Some(false),
                    job_error: Some(Some(format!("job submission failed: {err}"))),
                    message: Some(JobStatus::Error.default_message().to_string()),
                    ..Patch::default()
                },
                effects,
            ),
            Ok(created) => {
                let request_id = created.request_id;
                self.commit(
                    Patch {
                        request_id: Some(Some(request_id.clone())),
                        ..Patch::default()
                    },
                    effects,
                );
                self.poll_generation += 1;
                self.apply_status(
                    request_id,
                    StatusReply {
                        status: created.status,
                        progress: None,
                        message: None,
                    },
                    effects,
                );
            }
        }
    }

    pub(crate) fn poll_tick(&mut self, effects: &mut Vec<Effect>) {
        // Ticks while a request is outstanding are dropped.
        match &self.poll {
            PollPhase::Waiting { request_id } => {
                let request_id = request_id.clone();
                self.request_status(request_id, effects);
            }
            PollPhase::Standby {
                request_id,
                quiet_ticks,
            } => {
                let (request_id, quiet_ticks) = (request_id.clone(), *quiet_ticks);
                let quiet_ticks = if std::mem::take(&mut self.sibling_active) {
                    0
                } else {
                    quiet_ticks + 1
                };
                if quiet_ticks >= STANDBY_QUIET_TICKS {
                    self.request_status(request_id, effects);
                } else {
                    self.poll = PollPhase::Standby {
                        request_id,
                        quiet_ticks,
                    };
                    effects.push(Effect::ArmPollTimer);
                }
            }
            _ => {}
        }
    }

    fn request_status(&mut self, request_id: RequestId, effects: &mut Vec<Effect>) {
        if self.snapshot().job.request_id.as_ref() != Some(&request_id) {
            self.poll = PollPhase::Finished {
                request_id,
                outcome: PollOutcome::Released,
            };
            return;
        }
        self.poll = PollPhase::InFlight {
            request_id: request_id.clone(),
        };
        effects.push(Effect::PollStatus {
            request_id,
            generation: self.poll_generation,
        });
    }

    pub(crate) fn status_received(
        &mut self,
        request_id: RequestId,
        generation: u64,
        result: Result<StatusReply, String>,
        effects: &mut Vec<Effect>,
    ) {
        let expected = matches!(&self.poll, PollPhase::InFlight { request_id: polled } if *polled == request_id);
        if !expected || generation != self.poll_generation {
            return;
        }

        match result {
            Ok(reply) => self.apply_status(request_id, reply, effects),
            Err(err) => {
                self.poll = PollPhase::Finished {
                    request_id,
                    outcome: PollOutcome::TransportError,
                };
                self.commit(
                    Patch {
                        job_loading: Some(false),
                        job_error: Some(Some(format!("status request failed: {err}"))),
                        ..Patch::default()
                    },
                    effects,
                );
            }
        }
    }

    pub(crate) fn result_fetched(
        &mut self,
        request_id: RequestId,
        result: Result<JobResult, String>,
        effects: &mut Vec<Effect>,
    ) {
        if self.fetch_pending.as_ref() == Some(&request_id) {
            self.fetch_pending = None;
        }
        if self.snapshot().job.request_id.as_ref() != Some(&request_id) {
            return;
        }
        let patch = match result {
            Ok(job_result) => Patch {
                job_result: Some(Some(job_result)),
                job_loading: Some(false),
                job_error: Some(None),
                ..Patch::default()
            },
            Err(err) => Patch {
                job_loading: Some(false),
                job_error: Some(Some(format!(
                    "job completed, but results could not be loaded: {err}"
                ))),
                ..Patch::default()
            },
        };
        self.commit(patch, effects);
    }

    /// Watches a job that a previous session left running. Polling starts
    /// only after [`STANDBY_QUIET_TICKS`] intervals without a sibling
    /// reporting on it.
    pub(crate) fn resume_polling(&mut self, effects: &mut Vec<Effect>) {
        let job = &self.snapshot().job;
        if !job.is_running() {
            return;
        }
        if let Some(request_id) = job.request_id.clone() {
            self.absorb(&Patch {
                job_loading: Some(true),
                ..Patch::default()
            });
            self.poll_generation += 1;
            self.sibling_active = false;
            self.poll = PollPhase::Standby {
                request_id,
                quiet_ticks: 0,
            };
            effects.push(Effect::ArmPollTimer);
        }
    }

    /// Filters a received patch before it is merged.
    ///
    /// A `Running` report for a job already seen terminal here is stale and
    /// dropped. Reports on a standby job mark the sibling as its poller.
    pub(crate) fn screen_remote(&mut self, mut patch: Patch) -> Patch {
        let target = match &patch.request_id {
            Some(request_id) => request_id.clone(),
            None => self.snapshot().job.request_id.clone(),
        };
        let Some(target) = target else {
            return patch;
        };

        if patch.job_status == Some(Some(JobStatus::Running))
            && self.terminal_requests.contains(&target)
        {
            patch.job_status = None;
            patch.progress = None;
            patch.message = None;
        }

        let standby = matches!(&self.poll, PollPhase::Standby { request_id, .. } if *request_id == target);
        if standby && (patch.job_status.is_some() || patch.progress.is_some()) {
            self.sibling_active = true;
        }
        patch
    }

    /// Stops local job work when another context replaced or finished the job.
    pub(crate) fn release_if_superseded(&mut self, effects: &mut Vec<Effect>) {
        let job = &self.snapshot().job;
        let current = job.request_id.clone();
        let finished = job.status.is_some_and(JobStatus::is_terminal);

        let mut released = false;
        if let Some(polled) = self.poll.polled_request() {
            if current.as_ref() != Some(polled) || finished {
                self.stop_polling(PollOutcome::Released, effects);
                released = true;
            }
        }
        if self
            .fetch_pending
            .as_ref()
            .is_some_and(|fetching| current.as_ref() != Some(fetching))
        {
            self.fetch_pending = None;
            released = true;
        }

        if released && self.snapshot().job.loading {
            self.absorb(&Patch {
                job_loading: Some(false),
                ..Patch::default()
            });
        }
    }

    fn apply_status(&mut self, request_id: RequestId, reply: StatusReply, effects: &mut Vec<Effect>) {
        let job = &self.snapshot().job;
        match WireStatus::from_code(reply.status) {
            // Unrecognized codes (e.g. a queued state) are not terminal: keep polling.
            WireStatus::Known(JobStatus::Running) | WireStatus::Unknown(_) => {
                let progress = reply
                    .progress
                    .filter(|p| p.is_finite())
                    .map(|p| p.clamp(0.0, 1.0))
                    .map_or(job.progress, |p| p.max(job.progress));
                let message = reply
                    .message
                    .unwrap_or_else(|| JobStatus::Running.default_message().to_string());
                self.commit(
                    Patch {
                        job_status: Some(Some(JobStatus::Running)),
                        progress: Some(progress),
                        message: Some(message),
                        job_loading: Some(true),
                        ..Patch::default()
                    },
                    effects,
                );
                self.start_polling(request_id, effects);
            }
            WireStatus::Known(JobStatus::Done) => {
                let fetch = self.results_requested.insert(request_id.clone());
                if fetch {
                    self.fetch_pending = Some(request_id.clone());
                }
                self.poll = PollPhase::Finished {
                    request_id: request_id.clone(),
                    outcome: PollOutcome::Done,
                };
                self.commit(
                    Patch {
                        job_status: Some(Some(JobStatus::Done)),
                        progress: Some(1.0),
                        message: Some(reply.message.unwrap_or_else(|| {
                            JobStatus::Done.default_message().to_string()
                        })),
                        job_loading: Some(fetch),
                        ..Patch::default()
                    },
                    effects,
                );
                if fetch {
                    effects.push(Effect::FetchResult { request_id });
                }
            }
            WireStatus::Known(status @ (JobStatus::Error | JobStatus::Cancelled)) => {
                let outcome = if status == JobStatus::Error {
                    PollOutcome::Error
                } else {
                    PollOutcome::Cancelled
                };
                self.poll = PollPhase::Finished {
                    request_id,
                    outcome,
                };
                self.commit(
                    Patch {
                        job_status: Some(Some(status)),
                        job_loading: Some(false),
                        message: Some(
                            reply
                                .message
                                .unwrap_or_else(|| status.default_message().to_string()),
                        ),
                        ..Patch::default()
                    },
                    effects,
                );
            }
        }
    }

    fn start_polling(&mut self, request_id: RequestId, effects: &mut Vec<Effect>) {
        self.poll = PollPhase::Waiting { request_id };
        effects.push(Effect::ArmPollTimer);
    }

    fn stop_polling(&mut self, outcome: PollOutcome, effects: &mut Vec<Effect>) {
        if let Some(request_id) = self.poll.polled_request().cloned() {
            self.poll = PollPhase::Finished {
                request_id,
                outcome,
            };
            effects.push(Effect::StopPollTimer);
        }
    }

    /// Local half of a cancellation: stop watching and mark the job cancelled.
    fn cancel_locally(&mut self, effects: &mut Vec<Effect>) {
        self.stop_polling(PollOutcome::Cancelled, effects);
        self.commit(
            Patch {
                job_status: Some(Some(JobStatus::Cancelled)),
                job_loading: Some(false),
                message: Some(JobStatus::Cancelled.default_message().to_string()),
                ..Patch::default()
            },
            effects,
        );
    }
}
