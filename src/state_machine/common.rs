// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Outcome of one state step.
pub enum Transition<S, R> {
    /// Move to another state.
    Next(S, R),
    /// Run the same state again.
    Stay(R),
    /// Finished with a result.
    Done(R),
}

pub trait StateMachine<Ctx, Resp>: Sized {
    fn step(&mut self, ctx: &mut Ctx) -> Resp;
}
