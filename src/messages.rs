//! Message types for handing work to the presentation engine.
//!
//! Device handlers run on the session task while the presentation engine runs
//! on its own update loop. The only way between them is this action queue:
//! each action that needs an answer carries a oneshot sender, and the helper
//! constructors return the matching receiver.

use crate::error::OpiResult;
use crate::presentation::{Background, PresentResult, Stimulus};
use tokio::sync::oneshot;

/// Work posted to the presentation engine.
#[derive(Debug)]
pub enum Action {
    /// Reveal the display.
    Show {
        /// Answered once the display is visible.
        response: oneshot::Sender<()>,
    },

    /// Apply background and fixation settings.
    Setup {
        /// Settings to apply.
        background: Background,
        /// Answered once the settings are applied.
        response: oneshot::Sender<()>,
    },

    /// Run a stimulus sequence; answered once the result is built.
    Present {
        /// Sequence to show, in order.
        stimuli: Vec<Stimulus>,
        /// Receives the result, or why the run was refused or abandoned.
        response: oneshot::Sender<OpiResult<PresentResult>>,
    },

    /// The subject pressed the response button.
    Respond,

    /// Hide everything, abandon any running presentation and close the display.
    Close {
        /// Answered once the display is closed.
        response: oneshot::Sender<()>,
    },
}

impl Action {
    /// Helper to create a Show action
    pub fn show() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Show { response: tx }, rx)
    }

    /// Helper to create a Setup action
    pub fn setup(background: Background) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Setup {
                background,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a Present action
    pub fn present(
        stimuli: Vec<Stimulus>,
    ) -> (Self, oneshot::Receiver<OpiResult<PresentResult>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Present {
                stimuli,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a Close action
    pub fn close() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Close { response: tx }, rx)
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Show { .. } => "show",
            Action::Setup { .. } => "setup",
            Action::Present { .. } => "present",
            Action::Respond => "respond",
            Action::Close { .. } => "close",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_pairs_sender_with_receiver() {
        let (action, rx) = Action::close();
        assert_eq!(action.name(), "close");
        if let Action::Close { response } = action {
            response.send(()).unwrap();
        }
        assert!(rx.blocking_recv().is_ok());
    }

    #[test]
    fn test_present_carries_stimuli() {
        let (action, _rx) = Action::present(vec![Stimulus::default(); 2]);
        match action {
            Action::Present { stimuli, .. } => assert_eq!(stimuli.len(), 2),
            other => panic!("unexpected action {}", other.name()),
        }
    }
}
