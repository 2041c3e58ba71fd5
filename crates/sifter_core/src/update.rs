use crate::{Effect, Msg, Patch, QueryRequest, SifterState};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: SifterState, msg: Msg) -> (SifterState, Vec<Effect>) {
    let mut effects = Vec::new();
    match msg {
        Msg::SetField(field) => state.commit(field.into_patch(), &mut effects),
        Msg::Select(key) => state.commit(
            Patch {
                selection: Some(Some(key)),
                ..Patch::default()
            },
            &mut effects,
        ),
        Msg::RunQuery => {
            state.query_generation += 1;
            let request = QueryRequest::from(&state.snapshot().filters);
            state.commit(
                Patch {
                    loading: Some(true),
                    error: Some(None),
                    ..Patch::default()
                },
                &mut effects,
            );
            effects.push(Effect::RunQuery {
                generation: state.query_generation,
                request,
            });
        }
        Msg::QueryCompleted { generation, result } => {
            // A newer query owns the loading flag; drop the stale answer.
            if generation != state.query_generation {
                return (state, effects);
            }
            let patch = match result {
                Ok(rows) => Patch {
                    rows: Some(rows),
                    loading: Some(false),
                    error: Some(None),
                    ..Patch::default()
                },
                Err(err) => Patch {
                    loading: Some(false),
                    error: Some(Some(err)),
                    ..Patch::default()
                },
            };
            state.commit(patch, &mut effects);
        }
        Msg::StartJob => state.start_job(&mut effects),
        Msg::CancelJob => state.cancel_job(&mut effects),
        Msg::JobCreated { generation, result } => {
            state.job_created(generation, result, &mut effects)
        }
        Msg::PollTick => state.poll_tick(&mut effects),
        Msg::StatusReceived {
            request_id,
            generation,
            result,
        } => state.status_received(request_id, generation, result, &mut effects),
        Msg::ResultFetched { request_id, result } => {
            state.result_fetched(request_id, result, &mut effects)
        }
        Msg::Restore(record) => {
            state.absorb(&record.to_patch());
            state.resume_polling(&mut effects);
        }
        Msg::RemotePatch(patch) => {
            let patch = state.screen_remote(patch.into_received());
            state.absorb(&patch);
            state.release_if_superseded(&mut effects);
        }
    }

    (state, effects)
}
