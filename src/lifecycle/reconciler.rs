//! Command lifecycle reconciliation.
//!
//! Brings the platform's registered commands in line with the local
//! declarations:
//! 1. For each declared command and each target it applies to, the guild
//!    predicate is checked, then the remote record is created, updated or left
//!    alone depending on whether it exists and matches.
//! 2. A garbage-collection pass deletes remote records that no local
//!    declaration accounts for.
//!
//! Remote lists are fetched at most once per target per pass and kept current
//! as records change. Every failure is reported and skipped; the rest of the
//! pass carries on.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serenity::all::{CommandId, GuildId};

use crate::common::error::DiscordResult;
use crate::common::telemetry::Telemetry;
use crate::interaction::command::{CommandKey, CommandKind, CommandScope, CommandSpec, PermissionRule};
use crate::lifecycle::api::{CommandApi, RemoteCommand, Target};

/// What reconciliation did for one command on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Created,
    Updated,
    Deleted,
    Unchanged,
    PermissionsSynced,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Unchanged => "unchanged",
            Self::PermissionsSynced => "permissions synced",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub target: Target,
    pub kind: CommandKind,
    pub name: String,
    pub status: Status,
}

/// Per-pass cache of remote state.
#[derive(Debug, Default)]
pub struct Snapshot {
    commands: HashMap<Target, Vec<RemoteCommand>>,
    permissions: HashMap<GuildId, HashMap<CommandId, Vec<PermissionRule>>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    async fn commands<A: CommandApi + ?Sized>(
        &mut self,
        api: &A,
        target: Target,
    ) -> DiscordResult<&mut Vec<RemoteCommand>> {
        if !self.commands.contains_key(&target) {
            let listed = api.list(target).await?;
            self.commands.insert(target, listed);
        }
        Ok(self.commands.entry(target).or_default())
    }

    async fn permissions<A: CommandApi + ?Sized>(
        &mut self,
        api: &A,
        guild: GuildId,
    ) -> DiscordResult<&mut HashMap<CommandId, Vec<PermissionRule>>> {
        if !self.permissions.contains_key(&guild) {
            let fetched = api.fetch_permissions(guild).await?;
            self.permissions.insert(guild, fetched);
        }
        Ok(self.permissions.entry(guild).or_default())
    }
}

/// Reconciliation behaviour switches.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub collect_garbage: bool,
    pub sync_permissions: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            collect_garbage: true,
            sync_permissions: true,
        }
    }
}

pub struct CommandReconciler<A: CommandApi + ?Sized> {
    api: Arc<A>,
    options: ReconcileOptions,
    telemetry: Telemetry,
}

impl<A: CommandApi + ?Sized> CommandReconciler<A> {
    pub fn new(api: Arc<A>, options: ReconcileOptions, telemetry: Telemetry) -> Self {
        Self {
            api,
            options,
            telemetry: telemetry.child("lifecycle"),
        }
    }

    /// Startup pass: every declared command against every target, then garbage collection.
    pub async fn reconcile_all(&self, specs: &[CommandSpec], guilds: &[GuildId]) -> Vec<Outcome> {
        let mut snapshot = Snapshot::new();
        let mut outcomes = Vec::new();

        for spec in specs {
            outcomes.extend(self.reconcile_command(spec, guilds, &mut snapshot).await);
        }
        if self.options.collect_garbage {
            let mut targets = vec![Target::Global];
            targets.extend(guilds.iter().copied().map(Target::Guild));
            outcomes.extend(self.collect_garbage(specs, &targets, &mut snapshot).await);
        }
        outcomes
    }

    /// Guild-join pass: guild-scoped commands for one guild, then garbage collection there.
    pub async fn reconcile_guild(&self, specs: &[CommandSpec], guild: GuildId) -> Vec<Outcome> {
        let mut snapshot = Snapshot::new();
        let mut outcomes = Vec::new();

        for spec in specs.iter().filter(|spec| !spec.scope.is_global()) {
            outcomes.extend(self.reconcile_command(spec, &[guild], &mut snapshot).await);
        }
        if self.options.collect_garbage {
            outcomes.extend(
                self.collect_garbage(specs, &[Target::Guild(guild)], &mut snapshot)
                    .await,
            );
        }
        outcomes
    }

    /// Reconcile one command. `guilds` is the guild set for guild-scoped commands.
    pub async fn reconcile_command(
        &self,
        spec: &CommandSpec,
        guilds: &[GuildId],
        snapshot: &mut Snapshot,
    ) -> Vec<Outcome> {
        match &spec.scope {
            CommandScope::Global => vec![self.ensure(spec, Target::Global, snapshot).await],
            CommandScope::Guild {
                eligible,
                permissions,
            } => {
                let mut outcomes = Vec::with_capacity(guilds.len());
                for &guild in guilds {
                    let target = Target::Guild(guild);

                    let is_eligible = match eligible {
                        Some(predicate) => match predicate(guild).await {
                            Ok(is_eligible) => is_eligible,
                            Err(e) => {
                                self.telemetry.error(format!(
                                    "Eligibility check for {} in {} failed, treating as ineligible: {:#}",
                                    spec.key(),
                                    target,
                                    e
                                ));
                                false
                            }
                        },
                        None => true,
                    };

                    if !is_eligible {
                        if let Some(outcome) = self.remove(spec, target, snapshot).await {
                            outcomes.push(outcome);
                        }
                        continue;
                    }

                    let outcome = self.ensure(spec, target, snapshot).await;
                    let failed = outcome.status == Status::Failed;
                    outcomes.push(outcome);

                    if !failed && self.options.sync_permissions {
                        if let Some(outcome) =
                            self.sync_permissions(spec, guild, permissions, snapshot).await
                        {
                            outcomes.push(outcome);
                        }
                    }
                }
                outcomes
            }
        }
    }

    /// Delete remote records on `targets` that no declaration in `specs` accounts for.
    pub async fn collect_garbage(
        &self,
        specs: &[CommandSpec],
        targets: &[Target],
        snapshot: &mut Snapshot,
    ) -> Vec<Outcome> {
        let global: BTreeSet<CommandKey> = specs
            .iter()
            .filter(|spec| spec.scope.is_global())
            .map(CommandSpec::key)
            .collect();
        let per_guild: BTreeSet<CommandKey> = specs
            .iter()
            .filter(|spec| !spec.scope.is_global())
            .map(CommandSpec::key)
            .collect();

        let mut outcomes = Vec::new();
        for &target in targets {
            let declared = match target {
                Target::Global => &global,
                Target::Guild(_) => &per_guild,
            };

            let stale: Vec<RemoteCommand> = match snapshot.commands(self.api.as_ref(), target).await
            {
                Ok(records) => records
                    .iter()
                    .filter(|record| !declared.contains(&record.shape.key()))
                    .cloned()
                    .collect(),
                Err(e) => {
                    self.telemetry
                        .error(format!("Failed to list commands for {}: {}", target, e));
                    continue;
                }
            };

            for record in stale {
                let status = match self.api.delete(target, record.id).await {
                    Ok(()) => {
                        if let Ok(records) = snapshot.commands(self.api.as_ref(), target).await {
                            records.retain(|r| r.id != record.id);
                        }
                        Status::Deleted
                    }
                    Err(e) => {
                        self.telemetry.error(format!(
                            "Failed to delete stale {} command '{}' from {}: {}",
                            record.shape.kind, record.shape.name, target, e
                        ));
                        Status::Failed
                    }
                };
                outcomes.push(self.report(target, record.shape.kind, &record.shape.name, status));
            }
        }
        outcomes
    }

    /// Make sure `target` holds a record matching `spec`.
    async fn ensure(&self, spec: &CommandSpec, target: Target, snapshot: &mut Snapshot) -> Outcome {
        let api = self.api.as_ref();
        let records = match snapshot.commands(api, target).await {
            Ok(records) => records,
            Err(e) => {
                self.telemetry
                    .error(format!("Failed to list commands for {}: {}", target, e));
                return self.report(target, spec.kind(), spec.name(), Status::Failed);
            }
        };

        let existing = records
            .iter()
            .position(|record| record.matches_key(spec.name(), spec.kind()));

        let status = match existing {
            None => match api.create(target, &spec.shape).await {
                Ok(created) => {
                    records.push(created);
                    Status::Created
                }
                Err(e) => {
                    self.telemetry
                        .error(format!("Failed to create {} on {}: {}", spec.key(), target, e));
                    Status::Failed
                }
            },
            Some(index) if records[index].equals(&spec.shape) => Status::Unchanged,
            Some(index) => match api.update(target, records[index].id, &spec.shape).await {
                Ok(updated) => {
                    records[index] = updated;
                    Status::Updated
                }
                Err(e) => {
                    self.telemetry
                        .error(format!("Failed to update {} on {}: {}", spec.key(), target, e));
                    Status::Failed
                }
            },
        };

        self.report(target, spec.kind(), spec.name(), status)
    }

    /// Delete the record for `spec` on `target`, if there is one.
    async fn remove(
        &self,
        spec: &CommandSpec,
        target: Target,
        snapshot: &mut Snapshot,
    ) -> Option<Outcome> {
        let api = self.api.as_ref();
        let records = match snapshot.commands(api, target).await {
            Ok(records) => records,
            Err(e) => {
                self.telemetry
                    .error(format!("Failed to list commands for {}: {}", target, e));
                return Some(self.report(target, spec.kind(), spec.name(), Status::Failed));
            }
        };

        let index = records
            .iter()
            .position(|record| record.matches_key(spec.name(), spec.kind()))?;

        let status = match api.delete(target, records[index].id).await {
            Ok(()) => {
                records.remove(index);
                Status::Deleted
            }
            Err(e) => {
                self.telemetry
                    .error(format!("Failed to delete {} from {}: {}", spec.key(), target, e));
                Status::Failed
            }
        };
        Some(self.report(target, spec.kind(), spec.name(), status))
    }

    /// Bring the guild's permission overwrites for `spec` in line with `rules`.
    async fn sync_permissions(
        &self,
        spec: &CommandSpec,
        guild: GuildId,
        rules: &[PermissionRule],
        snapshot: &mut Snapshot,
    ) -> Option<Outcome> {
        let api = self.api.as_ref();
        let target = Target::Guild(guild);

        let id = snapshot
            .commands(api, target)
            .await
            .ok()?
            .iter()
            .find(|record| record.matches_key(spec.name(), spec.kind()))?
            .id;

        let current = match snapshot.permissions(api, guild).await {
            Ok(current) => current,
            Err(e) => {
                self.telemetry.error(format!(
                    "Failed to fetch command permissions for {}: {}",
                    target, e
                ));
                return Some(self.report(target, spec.kind(), spec.name(), Status::Failed));
            }
        };

        let mut wanted = rules.to_vec();
        wanted.sort();
        let mut existing = current.get(&id).cloned().unwrap_or_default();
        existing.sort();
        if wanted == existing {
            return None;
        }

        let status = match api.set_permissions(guild, id, &wanted).await {
            Ok(()) => {
                current.insert(id, wanted);
                Status::PermissionsSynced
            }
            Err(e) => {
                self.telemetry.error(format!(
                    "Failed to set permissions of {} on {}: {}",
                    spec.key(),
                    target,
                    e
                ));
                Status::Failed
            }
        };
        Some(self.report(target, spec.kind(), spec.name(), status))
    }

    fn report(&self, target: Target, kind: CommandKind, name: &str, status: Status) -> Outcome {
        if !matches!(status, Status::Unchanged | Status::Failed) {
            self.telemetry.log(format!(
                "{} {} {} command '{}'",
                capitalise(&status.to_string()),
                target,
                kind,
                name
            ));
        }
        Outcome {
            target,
            kind,
            name: name.to_string(),
            status,
        }
    }
}

fn capitalise(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
