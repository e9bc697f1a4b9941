use thiserror::Error;

use crate::model::account::Identity;
use crate::model::exam::ExamSession;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session is not authenticated")]
    NotAuthenticated,

    #[error("an exam session is already open")]
    ExamAlreadyOpen,

    #[error("no exam session is open")]
    NoExamSession,
}

/// One user's interaction with the system.
///
/// An exam session can only be attached while authenticated; signing out
/// drops it together with the identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    identity: Option<Identity>,
    exam: Option<ExamSession>,
}

impl Session {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            exam: None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn exam(&self) -> Option<&ExamSession> {
        self.exam.as_ref()
    }

    /// Mutable access to the open attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NoExamSession` if nothing is open.
    pub fn exam_mut(&mut self) -> Result<&mut ExamSession, SessionStateError> {
        self.exam.as_mut().ok_or(SessionStateError::NoExamSession)
    }

    /// Attach a freshly opened attempt.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` for anonymous sessions and `ExamAlreadyOpen`
    /// if an attempt is already attached.
    pub fn attach_exam(
        &mut self,
        exam: ExamSession,
    ) -> Result<&mut ExamSession, SessionStateError> {
        if !self.is_authenticated() {
            return Err(SessionStateError::NotAuthenticated);
        }
        if self.exam.is_some() {
            return Err(SessionStateError::ExamAlreadyOpen);
        }
        Ok(self.exam.insert(exam))
    }

    /// Remove the attempt, returning it.
    pub fn detach_exam(&mut self) -> Option<ExamSession> {
        self.exam.take()
    }
}
