use proctor_core::model::{
    AttemptId, CheckKind, CheckStatus, ExamId, ExamPhase, Incident, IncidentId, ProctorSetting,
    Role, UserId,
};

/// Observable events published by `SessionMachine` for the presentation layer.
///
/// Events are sent while the store is locked, so subscribers see them in the
/// order the mutations happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user_id: UserId, role: Role },
    SignedOut,
    PhaseChanged {
        attempt_id: AttemptId,
        from: ExamPhase,
        to: ExamPhase,
    },
    ConsentChanged { given: bool },
    CheckUpdated { kind: CheckKind, status: CheckStatus },
    Tick { remaining_seconds: u64 },
    IncidentRaised(Incident),
    IncidentExpired { id: IncidentId },
    ExamClosed { exam_id: ExamId, final_phase: ExamPhase },
    SettingToggled { setting: ProctorSetting, enabled: bool },
}
