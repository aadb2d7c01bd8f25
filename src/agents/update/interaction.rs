use crate::agents::snapshot_store::Snapshot;
use crate::agents::update::orchestrator::UpdateCandidate;
use crate::error::{Result, SafebumpError};
use crate::npm::RiskLevel;
use colored::Colorize;
use std::io::{self, BufRead, Write};

/// Prompts shown during interactive updates and rollbacks.
///
/// An empty answer (or end of input) picks the default shown in capitals.
pub struct UpdateInteraction {
    enabled: bool,
    apply_all: bool,
    input: Box<dyn BufRead>,
}

impl UpdateInteraction {
    pub fn new(enabled: bool) -> Self {
        Self::with_input(enabled, io::BufReader::new(io::stdin()))
    }

    pub fn with_input(enabled: bool, input: impl BufRead + 'static) -> Self {
        Self {
            enabled,
            apply_all: false,
            input: Box::new(input),
        }
    }

    /// Asks about each candidate in turn. Security fixes and patch updates
    /// default to yes, everything else to no.
    pub fn choose_candidates(
        &mut self,
        candidates: Vec<UpdateCandidate>,
    ) -> Result<Vec<UpdateCandidate>> {
        if !self.enabled {
            return Ok(candidates);
        }

        let mut chosen = Vec::new();
        for candidate in candidates {
            if self.confirm_candidate(&candidate)? {
                chosen.push(candidate);
            }
        }
        Ok(chosen)
    }

    fn confirm_candidate(&mut self, candidate: &UpdateCandidate) -> Result<bool> {
        println!(
            "\n{} {} {} {} to {} {}",
            format!("[{}]", candidate.risk_level).cyan().bold(),
            candidate.name.white().bold(),
            "from".dimmed(),
            candidate.current_version.red(),
            candidate.latest_version.green().bold(),
            format!("({})", candidate.update_type).dimmed()
        );

        if self.apply_all {
            println!("{}", "Auto-applying (previously selected 'all').".dimmed());
            return Ok(true);
        }

        let default_yes = candidate.has_security_issue || candidate.risk_level == RiskLevel::Safe;
        let prompt = if default_yes {
            "Apply this update? [Y/n/a/q]: "
        } else {
            "Apply this update? [y/N/a/q]: "
        };

        loop {
            let decision = self.ask(prompt)?;
            match decision.as_str() {
                "" => return Ok(default_yes),
                "y" | "yes" => return Ok(true),
                "n" | "no" => {
                    println!("{}", "Skipping this update.".dimmed());
                    return Ok(false);
                }
                "a" | "all" => {
                    println!(
                        "{}",
                        "Applying this and all remaining updates.".green().bold()
                    );
                    self.apply_all = true;
                    return Ok(true);
                }
                "q" | "quit" => {
                    println!("{}", "Stopping update process at user request.".yellow());
                    return Err(SafebumpError::UserCancelled);
                }
                _ => println!(
                    "{}",
                    "Please answer with y(es), n(o), a(ll), or q(quit).".red()
                ),
            }
        }
    }

    /// Yes/no question. Always asks, even when per-package prompts are off.
    pub fn confirm(&mut self, question: &str, default_yes: bool) -> Result<bool> {
        let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
        loop {
            let answer = self.ask(&format!("{question} {hint}: "))?;
            match answer.as_str() {
                "" => return Ok(default_yes),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => println!("{}", "Please answer with y(es) or n(o).".red()),
            }
        }
    }

    /// Numbered pick from the newest-first snapshot list; the newest is the
    /// default.
    pub fn choose_snapshot<'a>(&mut self, snapshots: &'a [Snapshot]) -> Result<&'a Snapshot> {
        let Some(newest) = snapshots.first() else {
            return Err(SafebumpError::SnapshotNotFound(
                "no snapshots available".to_string(),
            ));
        };
        if snapshots.len() == 1 {
            return Ok(newest);
        }

        for (idx, snapshot) in snapshots.iter().enumerate() {
            println!(
                "  {:>2}) {} {} {}",
                idx + 1,
                snapshot.id.bold(),
                snapshot.timestamp.to_string().dimmed(),
                snapshot.package_names.join(", ").cyan()
            );
        }

        loop {
            let answer = self.ask(&format!(
                "Select a snapshot to restore [1-{}] (or 'q' to cancel): ",
                snapshots.len()
            ))?;
            if answer.is_empty() {
                return Ok(newest);
            }
            if answer == "q" {
                return Err(SafebumpError::UserCancelled);
            }
            if let Ok(choice) = answer.parse::<usize>() {
                if (1..=snapshots.len()).contains(&choice) {
                    return Ok(&snapshots[choice - 1]);
                }
            }
            println!("{}", "Invalid selection. Please try again.".red());
        }
    }

    fn ask(&mut self, prompt: &str) -> Result<String> {
        print!("{}", prompt.bold());
        io::stdout().flush()?;

        let mut input = String::new();
        self.input.read_line(&mut input)?;
        Ok(input.trim().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::manifest_editor::DependencySection;
    use crate::npm::UpdateType;
    use jiff::Timestamp;
    use std::collections::BTreeMap;
    use std::io::Cursor;

    fn candidate(name: &str, update_type: UpdateType, risk_level: RiskLevel) -> UpdateCandidate {
        UpdateCandidate {
            name: name.to_string(),
            current_version: "1.0.0".to_string(),
            latest_version: "2.0.0".to_string(),
            update_type,
            risk_level,
            has_security_issue: risk_level == RiskLevel::Critical,
            section: DependencySection::Dependencies,
        }
    }

    fn snapshot(id: &str) -> Snapshot {
        Snapshot {
            id: id.to_string(),
            timestamp: Timestamp::UNIX_EPOCH,
            package_names: vec!["axios".to_string()],
            captured_files: BTreeMap::new(),
        }
    }

    fn names(candidates: &[UpdateCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn disabled_interaction_keeps_everything() {
        let mut interaction = UpdateInteraction::with_input(false, Cursor::new(""));
        let chosen = interaction
            .choose_candidates(vec![candidate("a", UpdateType::Major, RiskLevel::Breaking)])
            .unwrap();
        assert_eq!(names(&chosen), vec!["a"]);
    }

    #[test]
    fn empty_answers_follow_risk_defaults() {
        let mut interaction = UpdateInteraction::with_input(true, Cursor::new("\n\n\n"));
        let chosen = interaction
            .choose_candidates(vec![
                candidate("critical", UpdateType::Major, RiskLevel::Critical),
                candidate("breaking", UpdateType::Major, RiskLevel::Breaking),
                candidate("safe", UpdateType::Patch, RiskLevel::Safe),
            ])
            .unwrap();
        assert_eq!(names(&chosen), vec!["critical", "safe"]);
    }

    #[test]
    fn all_applies_remaining_and_quit_cancels() {
        let mut interaction = UpdateInteraction::with_input(true, Cursor::new("n\nmaybe\na\n"));
        let chosen = interaction
            .choose_candidates(vec![
                candidate("a", UpdateType::Minor, RiskLevel::Moderate),
                candidate("b", UpdateType::Minor, RiskLevel::Moderate),
                candidate("c", UpdateType::Major, RiskLevel::Breaking),
            ])
            .unwrap();
        assert_eq!(names(&chosen), vec!["b", "c"]);

        let mut interaction = UpdateInteraction::with_input(true, Cursor::new("q\n"));
        let err = interaction
            .choose_candidates(vec![candidate("a", UpdateType::Patch, RiskLevel::Safe)])
            .unwrap_err();
        assert!(matches!(err, SafebumpError::UserCancelled));
    }

    #[test]
    fn confirm_uses_default_on_empty_input() {
        let mut interaction = UpdateInteraction::with_input(false, Cursor::new("\nYES\n"));
        assert!(!interaction.confirm("Continue?", false).unwrap());
        assert!(interaction.confirm("Continue?", false).unwrap());
    }

    #[test]
    fn snapshot_choice_defaults_to_newest() {
        let snapshots = vec![snapshot("snapshot-b"), snapshot("snapshot-a")];

        let mut interaction = UpdateInteraction::with_input(true, Cursor::new("\n"));
        assert_eq!(interaction.choose_snapshot(&snapshots).unwrap().id, "snapshot-b");

        let mut interaction = UpdateInteraction::with_input(true, Cursor::new("9\n2\n"));
        assert_eq!(interaction.choose_snapshot(&snapshots).unwrap().id, "snapshot-a");

        let mut interaction = UpdateInteraction::with_input(true, Cursor::new(""));
        assert!(interaction.choose_snapshot(&[]).is_err());
    }
}
