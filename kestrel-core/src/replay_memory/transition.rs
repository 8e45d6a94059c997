/// One observed `(state, action, reward, next_state, terminal)` tuple.
///
/// Fields are read through accessors, so a transition cannot change after
/// it is created.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<O, A> {
    state: O,
    action: A,
    reward: f32,
    next_state: O,
    terminal: bool,
}

impl<O, A> Transition<O, A> {
    /// Constructs a transition.
    pub fn new(state: O, action: A, reward: f32, next_state: O, terminal: bool) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            terminal,
        }
    }

    /// State before the action.
    pub fn state(&self) -> &O {
        &self.state
    }

    /// Action taken.
    pub fn action(&self) -> &A {
        &self.action
    }

    /// Reward received.
    pub fn reward(&self) -> f32 {
        self.reward
    }

    /// State after the action.
    pub fn next_state(&self) -> &O {
        &self.next_state
    }

    /// `true` if the episode ended with this transition.
    pub fn terminal(&self) -> bool {
        self.terminal
    }
}
