//! `Greeter` trait for the one-shot spoken greeting.

use trailbot_types::FollowError;

/// Plays a phrase to the person being followed.
///
/// Called once per entry into ENGAGE.  Implementations should hand the
/// phrase off and return; playback must not stall the control loop.
pub trait Greeter: Send {
    fn greet(&mut self, phrase: &str) -> Result<(), FollowError>;
}

impl<G: Greeter + ?Sized> Greeter for Box<G> {
    fn greet(&mut self, phrase: &str) -> Result<(), FollowError> {
        (**self).greet(phrase)
    }
}

/// Greeter that only logs the phrase.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogGreeter;

impl Greeter for LogGreeter {
    fn greet(&mut self, phrase: &str) -> Result<(), FollowError> {
        tracing::info!(phrase, "greeting");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockSpeaker {
        said: Vec<String>,
    }

    impl Greeter for MockSpeaker {
        fn greet(&mut self, phrase: &str) -> Result<(), FollowError> {
            self.said.push(phrase.to_string());
            Ok(())
        }
    }

    #[test]
    fn mock_speaker_records_phrase() {
        let mut g = MockSpeaker { said: vec![] };
        g.greet("hello").unwrap();
        assert_eq!(g.said, vec!["hello".to_string()]);
    }

    #[test]
    fn log_greeter_always_succeeds() {
        let mut g: Box<dyn Greeter> = Box::new(LogGreeter);
        assert!(g.greet("hi").is_ok());
    }
}
