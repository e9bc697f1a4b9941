use std::time::Duration;

use anyhow::{Result, bail};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use proctor_core::model::{
    CheckStatus, ExamId, ExamPhase, ReadinessVerdict, format_remaining, is_low_time,
};
use services::{AppServices, SessionEvent, SessionMachine};

/// Rescans allowed per failed check before giving up.
const MAX_RESCANS: usize = 3;

pub struct Candidate {
    pub email: String,
    pub password: String,
    pub exam_id: ExamId,
    pub submit_after: Option<u64>,
}

/// Walk one attempt from sign-in to leaving the room, printing what happens.
pub async fn run(services: &AppServices, candidate: &Candidate) -> Result<()> {
    let machine = services.machine();
    let printer = spawn_printer(machine.subscribe());

    let identity = machine.login(&candidate.email, &candidate.password).await?;
    println!("signed in as {} ({})", identity.display_name(), identity.role());

    let exam = machine.enter_lobby(candidate.exam_id).await?;
    println!(
        "lobby: {} ({} allowed)",
        exam.title(),
        format_remaining(exam.duration_seconds())
    );

    pass_readiness(machine).await?;
    machine.give_consent()?;

    let mut phases = machine.subscribe();
    machine.start_active()?;
    println!("exam started");

    let finished = match candidate.submit_after {
        Some(seconds) => {
            tokio::select! {
                phase = wait_until_finished(&mut phases) => phase?,
                () = tokio::time::sleep(Duration::from_secs(seconds)) => {
                    machine.submit()?.phase
                }
            }
        }
        None => wait_until_finished(&mut phases).await?,
    };

    let outcome = machine.leave_room()?;
    let used = exam.duration_seconds().saturating_sub(outcome.remaining_seconds);
    println!(
        "attempt {} finished as {finished}: {} used, {} remaining, {} incident(s) raised",
        outcome.attempt_id,
        format_remaining(used),
        format_remaining(outcome.remaining_seconds),
        outcome.incidents_raised,
    );

    machine.logout()?;
    printer.abort();
    Ok(())
}

async fn pass_readiness(machine: &SessionMachine) -> Result<()> {
    let mut board = machine.run_checks().await?;
    for _ in 0..MAX_RESCANS {
        if board.verdict() == ReadinessVerdict::Passed {
            return Ok(());
        }
        for kind in board.failed() {
            println!("{kind} check failed, rescanning");
            board = machine.rescan(kind).await?;
        }
    }
    if board.verdict() == ReadinessVerdict::Passed {
        return Ok(());
    }
    let failed: Vec<String> = board.failed().iter().map(ToString::to_string).collect();
    bail!("readiness checks keep failing: {}", failed.join(", "))
}

async fn wait_until_finished(rx: &mut broadcast::Receiver<SessionEvent>) -> Result<ExamPhase> {
    loop {
        match rx.recv().await {
            Ok(SessionEvent::PhaseChanged { to, .. }) if to.is_terminal() => return Ok(to),
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => bail!("session closed before the exam finished"),
        }
    }
}

fn spawn_printer(mut rx: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::CheckUpdated { kind, status } if *status != CheckStatus::Pending => {
            println!("  {kind:<12} {status:?}");
        }
        SessionEvent::PhaseChanged { from, to, .. } => println!("  phase {from} -> {to}"),
        SessionEvent::Tick { remaining_seconds } => {
            let step = if is_low_time(*remaining_seconds) { 10 } else { 60 };
            if remaining_seconds % step == 0 {
                let marker = if is_low_time(*remaining_seconds) { " (low time)" } else { "" };
                println!("  {} remaining{marker}", format_remaining(*remaining_seconds));
            }
        }
        SessionEvent::IncidentRaised(incident) => {
            println!(
                "  ! [{}] {}",
                incident.category().severity(),
                incident.message()
            );
        }
        SessionEvent::IncidentExpired { id } => println!("  incident {id} dismissed"),
        _ => {}
    }
}
