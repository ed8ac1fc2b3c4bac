use fxhash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The share of a deposit that came from one Monte-Carlo particle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleContribution {
    pub particle_id: u64,
    pub pdg: i32,
    pub energy: f64,
    pub time: f64,
}

/// An energy deposit in one detector channel as produced by the simulation.
///
/// Energies are in MeV and times are absolute simulation times in ns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruthDeposit {
    pub channel_id: u64,
    pub energy: f64,
    pub time: f64,
    #[serde(default)]
    pub contributions: Vec<ParticleContribution>,
}

impl TruthDeposit {
    pub fn new(channel_id: u64, energy: f64, time: f64) -> Self {
        Self {
            channel_id,
            energy,
            time,
            contributions: Vec::new(),
        }
    }

    pub fn with_contribution(mut self, contribution: ParticleContribution) -> Self {
        self.contributions.push(contribution);
        self
    }

    /// Copy of the deposit moved to a new time. Particle contributions keep their
    /// particle links and energies and are moved along with it.
    pub fn clone_to_time(&self, time: f64) -> Self {
        Self {
            channel_id: self.channel_id,
            energy: self.energy,
            time,
            contributions: self
                .contributions
                .iter()
                .map(|c| ParticleContribution {
                    time,
                    ..c.clone()
                })
                .collect(),
        }
    }
}

/// Deposits are immutable once produced and shared between the truth stream,
/// the channel truth pipelines and integration records.
pub type SharedDeposit = Arc<TruthDeposit>;

/// Set of shared deposits keyed on identity rather than value. Two deposits with
/// identical contents are still distinct hits.
#[derive(Debug, Clone, Default)]
pub struct TruthSet {
    deposits: Vec<SharedDeposit>,
}

impl TruthSet {
    pub fn insert(&mut self, deposit: &SharedDeposit) {
        if !self.deposits.iter().any(|d| Arc::ptr_eq(d, deposit)) {
            self.deposits.push(deposit.clone());
        }
    }

    pub fn extend<'a>(&mut self, deposits: impl IntoIterator<Item = &'a SharedDeposit>) {
        for deposit in deposits {
            self.insert(deposit);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedDeposit> {
        self.deposits.iter()
    }

    pub fn len(&self) -> usize {
        self.deposits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McParticle {
    pub id: u64,
    pub pdg: i32,
    pub energy: f64,
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub parents: Vec<u64>,
    #[serde(default)]
    pub daughters: Vec<u64>,
}

/// Lookup of the Monte-Carlo particle tree by particle id
#[derive(Debug, Clone, Default)]
pub struct ParticleTable {
    particles: FxHashMap<u64, McParticle>,
}

impl ParticleTable {
    pub fn new(particles: impl IntoIterator<Item = McParticle>) -> Self {
        Self {
            particles: particles.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    pub fn get(&self, id: &u64) -> Option<&McParticle> {
        self.particles.get(id)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Ancestors of a particle which have no known parent themselves.
    /// A particle with no parents is its own root.
    pub fn root_particles(&self, id: u64) -> BTreeSet<u64> {
        let mut roots = BTreeSet::new();
        let mut visited = FxHashSet::default();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let known_parents: Vec<u64> = match self.particles.get(&current) {
                Some(p) => p
                    .parents
                    .iter()
                    .copied()
                    .filter(|parent| self.particles.contains_key(parent))
                    .collect(),
                None => Vec::new(),
            };
            if known_parents.is_empty() {
                roots.insert(current);
            } else {
                stack.extend(known_parents);
            }
        }
        roots
    }

    /// A particle and all of its descendants
    pub fn tree(&self, root: u64) -> BTreeSet<u64> {
        let mut members = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if !members.insert(current) {
                continue;
            }
            if let Some(p) = self.particles.get(&current) {
                stack.extend(p.daughters.iter().copied());
            }
        }
        members
    }

    /// The complete particle trees (root ancestors and all of their descendants)
    /// of every particle contributing to the given deposits, ordered by id.
    /// Ids missing from the table are skipped.
    pub fn truth_particles<'a>(
        &self,
        deposits: impl IntoIterator<Item = &'a TruthDeposit>,
    ) -> Vec<McParticle> {
        let mut ids = BTreeSet::new();
        for deposit in deposits {
            for contribution in deposit.contributions.iter() {
                for root in self.root_particles(contribution.particle_id) {
                    ids.extend(self.tree(root));
                }
            }
        }
        ids.iter()
            .filter_map(|id| self.particles.get(id).cloned())
            .collect()
    }
}
