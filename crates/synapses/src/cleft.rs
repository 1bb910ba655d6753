//! Synaptic cleft: transmitter pools, enzymatic metabolism, and competitive
//! protein binding.
//!
//! Binding treats every protein facing the cleft identically, whether it is
//! the axon's reuptake transporter or a dendrite's receptor: molecules
//! compete for available proteins and proteins compete for available
//! molecules, both weighted by affinity. The axon transporter binds first,
//! so the presynaptic side reclaims its native molecule before the residue
//! is distributed to receptors.
//!
//! Receptor occupancy re-equilibrates every tick: the previous bound
//! concentration returns to the pool before binding runs, so transmitter
//! mass only ever leaves through the enzymes or back into the axon.

use std::collections::HashMap;

use environment::{Environment, PoolCluster};
use neurochemistry::{metabolize, EnzymeId, MoleculeId, StochasticSampler, NUM_ENZYMES};
use tracing::debug;

use crate::axon::Axon;
use crate::dendrite::Dendrite;
use crate::{Result, SynapseError};

/// Pools below this count are flushed without a kinetics draw.
const SMALL_POOL: f64 = 1e-4;

/// Beta rate used for the metabolism draw.
const METABOLISM_RATE: f64 = 10.0;

/// The extracellular space between an axon and its dendrites.
#[derive(Debug)]
pub struct SynapticCleft {
    pools: PoolCluster<MoleculeId>,
    active_molecules: Vec<MoleculeId>,
    enzymes: [f64; NUM_ENZYMES],
    stable: bool,
}

impl SynapticCleft {
    /// Creates a cleft tracking `active_molecules`.
    ///
    /// With a single active molecule the cleft runs the cheaper simple
    /// binding path; two or more molecules engage the full competitive
    /// model.
    pub fn new(
        env: &mut Environment,
        active_molecules: Vec<MoleculeId>,
        enzyme_concentration: f64,
    ) -> Result<Self> {
        if active_molecules.is_empty() {
            return Err(SynapseError::InvalidParameter(
                "cleft needs at least one active molecule".into(),
            ));
        }
        if enzyme_concentration < 0.0 {
            return Err(SynapseError::InvalidParameter(format!(
                "negative enzyme concentration {enzyme_concentration}"
            )));
        }
        let pools = PoolCluster::register(env, active_molecules.iter().copied(), 0.0)?;
        Ok(Self {
            pools,
            active_molecules,
            enzymes: [enzyme_concentration; NUM_ENZYMES],
            stable: true,
        })
    }

    pub fn active_molecules(&self) -> &[MoleculeId] {
        &self.active_molecules
    }

    pub fn is_simple(&self) -> bool {
        self.active_molecules.len() == 1
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }

    pub fn enzyme_concentration(&self, enzyme: EnzymeId) -> f64 {
        self.enzymes[enzyme.index()]
    }

    pub fn set_enzyme_concentration(
        &mut self,
        concentration: f64,
        enzymes: &[EnzymeId],
    ) -> Result<()> {
        if concentration < 0.0 {
            return Err(SynapseError::InvalidParameter(format!(
                "negative enzyme concentration {concentration}"
            )));
        }
        for enzyme in enzymes {
            self.enzymes[enzyme.index()] = concentration;
        }
        Ok(())
    }

    /// Published concentration of one molecule.
    pub fn concentration(&self, env: &Environment, mol: MoleculeId) -> f64 {
        self.pools.concentration(env, mol)
    }

    /// Published total over all tracked molecules.
    pub fn total_concentration(&self, env: &Environment) -> f64 {
        self.pools.total(env)
    }

    /// Adds released transmitter to a pool. Called by the axon.
    pub fn deposit(&self, env: &Environment, mol: MoleculeId, amount: f64) {
        if let Some(pool) = self.pools.pool(mol) {
            pool.add(env, amount);
        }
    }

    /// Runs one tick: metabolism, then binding.
    ///
    /// Returns whether the cleft is stable (no transmitter anywhere in the
    /// cleft or on its dendrites).
    pub fn step(
        &mut self,
        env: &Environment,
        sampler: &mut StochasticSampler,
        axon: Option<&Axon>,
        dendrites: &[Dendrite],
    ) -> bool {
        let in_flight = self.total_concentration(env)
            + dendrites.iter().map(|d| d.bound(env)).sum::<f64>();
        if in_flight <= 0.0 {
            self.stable = true;
            return true;
        }

        self.stable = false;
        let destroyed = self.metabolize(env, sampler);
        self.bind(env, axon, dendrites, &destroyed);
        false
    }

    /// Enzymatic degradation; returns the amount destroyed per molecule so
    /// binding can shrink its transfer budgets accordingly.
    fn metabolize(
        &self,
        env: &Environment,
        sampler: &mut StochasticSampler,
    ) -> HashMap<MoleculeId, f64> {
        let mut destroyed_by_mol = HashMap::new();
        for &mol in &self.active_molecules {
            let count = self.pools.concentration(env, mol);
            if count <= 0.0 {
                continue;
            }
            let pool = match self.pools.pool(mol) {
                Some(pool) => pool,
                None => continue,
            };

            if count < SMALL_POOL {
                pool.remove(env, count);
                destroyed_by_mol.insert(mol, count);
                continue;
            }

            let enzyme_count = self.enzymes[mol.enzyme().index()];
            let velocity = metabolize(enzyme_count, count, mol.metab_rate());
            let destroyed = sampler.beta(velocity, METABOLISM_RATE).min(count);
            if destroyed > 0.0 {
                pool.remove(env, destroyed);
                destroyed_by_mol.insert(mol, destroyed);
                debug!(molecule = ?mol, destroyed, "cleft metabolism");
            }
        }
        destroyed_by_mol
    }

    /// Competitive binding across the axon transporter and all dendrite
    /// receptors.
    fn bind(
        &self,
        env: &Environment,
        axon: Option<&Axon>,
        dendrites: &[Dendrite],
        destroyed: &HashMap<MoleculeId, f64>,
    ) {
        // Unbind: previous occupancy re-enters the pool before the new
        // equilibrium forms.
        for dendrite in dendrites {
            let previous = dendrite.bound(env);
            if previous > 0.0 {
                if let Some(pool) = self.pools.pool(dendrite.native()) {
                    pool.add(env, previous);
                }
            }
            dendrite.set_bound(env, 0.0);
        }

        // Published pool concentrations; molecules that are absent do not
        // participate.
        let mut mol_conc: HashMap<MoleculeId, f64> = HashMap::new();
        for &mol in &self.active_molecules {
            let count = self.pools.concentration(env, mol);
            if count > 0.0 {
                mol_conc.insert(mol, count);
            }
        }
        if mol_conc.is_empty() {
            return;
        }

        // Reuptake capacity left on the axon membrane.
        let axon_headroom = axon.map_or(0.0, |a| (a.capacity() - a.concentration(env)).max(0.0));
        let axon_available = axon.map_or(0.0, |a| axon_headroom.min(a.density()));

        // mol_proteins[m]: available(P, m) * affinity(P, m) summed over
        // proteins. protein_mols[P]: mol_conc[m] * affinity(P, m) summed
        // over molecules.
        let mut mol_proteins: HashMap<MoleculeId, f64> = HashMap::new();
        let mut axon_mols = 0.0;
        let mut dendrite_mols = vec![0.0; dendrites.len()];

        if let Some(axon) = axon {
            for (mol, affinity) in axon.transporter().affinities() {
                let available = if mol == axon.native() {
                    axon_available
                } else {
                    axon.density()
                };
                if let Some(&conc) = mol_conc.get(&mol) {
                    *mol_proteins.entry(mol).or_default() += available * affinity;
                    axon_mols += conc * affinity;
                }
            }
        }
        for (dendrite, slot) in dendrites.iter().zip(dendrite_mols.iter_mut()) {
            if dendrite.density() == 0.0 {
                continue;
            }
            for (mol, affinity) in dendrite.receptor().affinities() {
                if let Some(&conc) = mol_conc.get(&mol) {
                    *mol_proteins.entry(mol).or_default() += dendrite.density() * affinity;
                    *slot += conc * affinity;
                }
            }
        }
        if mol_proteins.values().all(|&p| p <= 0.0) {
            return;
        }

        let simple = self.is_simple();

        // Remaining transferable budget per molecule: the published pool
        // minus what the enzymes already took. Binding never moves more than
        // the pool actually held.
        let mut remaining: HashMap<MoleculeId, f64> = mol_conc
            .iter()
            .map(|(&mol, &conc)| {
                let destroyed = destroyed.get(&mol).copied().unwrap_or(0.0);
                (mol, (conc - destroyed).max(0.0))
            })
            .collect();

        // Axon transporter binds first: reuptake of the native molecule.
        if let Some(axon) = axon {
            let native = axon.native();
            if axon_available > 0.0 {
                if let Some(&conc) = mol_conc.get(&native) {
                    let affinity = axon.transporter().affinity(native).unwrap_or(0.0);
                    let bound = bound_concentration(
                        axon_available * affinity,
                        affinity,
                        conc,
                        mol_proteins.get(&native).copied().unwrap_or(0.0),
                        axon_mols,
                        simple,
                    )
                    .min(axon_headroom);
                    let moved = self.transfer(env, native, bound, &mut remaining);
                    if moved > 0.0 {
                        axon.reserve().add_capped(env, moved, axon.capacity());
                    }
                }
            }
        }

        // Dendrite receptors bind the residue. Antagonists compete in the
        // preparation sums above but are never transferred.
        for (dendrite, &protein_mols) in dendrites.iter().zip(dendrite_mols.iter()) {
            if dendrite.density() == 0.0 {
                continue;
            }
            for &mol in dendrite.receptor().agonists() {
                let conc = match mol_conc.get(&mol) {
                    Some(&conc) => conc,
                    None => continue,
                };
                let competing = mol_proteins.get(&mol).copied().unwrap_or(0.0);
                if competing <= 0.0 {
                    continue;
                }
                let affinity = dendrite.receptor().affinity(mol).unwrap_or(0.0);
                let bound = bound_concentration(
                    dendrite.density() * affinity,
                    affinity,
                    conc,
                    competing,
                    protein_mols,
                    simple,
                );
                let moved = self.transfer(env, mol, bound, &mut remaining);
                if moved > 0.0 {
                    dendrite.add_bound(env, moved);
                }
            }
        }
    }

    /// Withdraws up to `amount` of `mol` from the cleft, bounded by the
    /// remaining per-molecule budget. Returns the amount actually moved.
    fn transfer(
        &self,
        env: &Environment,
        mol: MoleculeId,
        amount: f64,
        remaining: &mut HashMap<MoleculeId, f64>,
    ) -> f64 {
        let budget = remaining.entry(mol).or_default();
        let moved = amount.min(*budget).max(0.0);
        if moved > 0.0 {
            *budget -= moved;
            if let Some(pool) = self.pools.pool(mol) {
                pool.remove(env, moved);
            }
        }
        moved
    }
}

/// The competitive-binding kernel for one (protein, molecule) pair.
///
/// ```text
/// f_mol     = affinity * mol_conc / protein_mols
/// f_protein = pc / mol_proteins
/// k         = 1 - f_mol * f_protein
/// bound     = pc * mol_conc^2 / (mol_conc + k)
/// ```
///
/// In simple mode there is exactly one molecule, so the competing-molecules
/// fraction collapses to one: `protein_mols[P]` is exactly
/// `affinity * mol_conc[m]` when nothing else competes.
fn bound_concentration(
    pc: f64,
    affinity: f64,
    mol_conc: f64,
    mol_proteins: f64,
    protein_mols: f64,
    simple: bool,
) -> f64 {
    if pc <= 0.0 || mol_conc <= 0.0 || mol_proteins <= 0.0 {
        return 0.0;
    }
    let f_protein = pc / mol_proteins;
    let f_mol = if simple || protein_mols <= 0.0 {
        1.0
    } else {
        affinity * mol_conc / protein_mols
    };
    let k = 1.0 - f_mol * f_protein;
    (pc * mol_conc * mol_conc / (mol_conc + k)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReleaseMode, SynapseConfig};
    use approx::assert_relative_eq;
    use neurochemistry::Receptor;

    fn cleft_with_dendrite() -> (Environment, SynapticCleft, Vec<Dendrite>) {
        let mut env = Environment::new();
        let cleft = SynapticCleft::new(&mut env, vec![MoleculeId::Glutamate], 1.0).unwrap();
        let dendrite = Dendrite::new(&mut env, Receptor::ampa(), 0.25, 25.0).unwrap();
        (env, cleft, vec![dendrite])
    }

    #[test]
    fn test_empty_cleft_is_stable_noop() {
        let (mut env, mut cleft, dendrites) = cleft_with_dendrite();
        let mut sampler = StochasticSampler::new(0, 0.0).unwrap();

        assert!(cleft.step(&env, &mut sampler, None, &dendrites));
        env.step();
        // Binding idempotence: repeated steps on an empty cleft leave
        // dendrite occupancy untouched.
        assert!(cleft.step(&env, &mut sampler, None, &dendrites));
        env.step();
        assert_eq!(dendrites[0].bound(&env), 0.0);
        assert!(cleft.is_stable());
    }

    #[test]
    fn test_binding_moves_transmitter_to_dendrite() {
        let (mut env, mut cleft, dendrites) = cleft_with_dendrite();
        let mut sampler = StochasticSampler::new(0, 0.0).unwrap();

        cleft.deposit(&env, MoleculeId::Glutamate, 1.0);
        env.step();

        let stable = cleft.step(&env, &mut sampler, None, &dendrites);
        env.step();

        assert!(!stable);
        assert!(dendrites[0].bound(&env) > 0.0);
        assert!(cleft.concentration(&env, MoleculeId::Glutamate) < 1.0);
    }

    #[test]
    fn test_simple_mode_bound_value() {
        // Single molecule, single receptor, no enzymes: the kernel reduces
        // to f_mol = 1, f_protein = 1, k = 0, so with pc = 0.25 * 0.8 and a
        // unit pool the dendrite binds exactly pc * 1^2 / (1 + 0) = 0.2.
        let mut env = Environment::new();
        let mut cleft = SynapticCleft::new(&mut env, vec![MoleculeId::Glutamate], 0.0).unwrap();
        let dendrite = Dendrite::new(&mut env, Receptor::ampa(), 0.25, 25.0).unwrap();
        let dendrites = vec![dendrite];
        let mut sampler = StochasticSampler::new(0, 0.0).unwrap();

        cleft.deposit(&env, MoleculeId::Glutamate, 1.0);
        env.step();
        cleft.step(&env, &mut sampler, None, &dendrites);
        env.step();

        assert_relative_eq!(dendrites[0].bound(&env), 0.2, epsilon = 1e-12);
        assert_relative_eq!(
            cleft.concentration(&env, MoleculeId::Glutamate),
            0.8,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_metabolism_drains_the_pool() {
        let mut env = Environment::new();
        let mut cleft = SynapticCleft::new(&mut env, vec![MoleculeId::Glutamate], 1.0).unwrap();
        let mut sampler = StochasticSampler::new(0, 0.0).unwrap();

        cleft.deposit(&env, MoleculeId::Glutamate, 1.0);
        env.step();

        // No proteins at all: only the enzymes act.
        cleft.step(&env, &mut sampler, None, &[]);
        env.step();
        let after = cleft.concentration(&env, MoleculeId::Glutamate);
        assert!(after < 1.0);
        assert!(after > 0.0);

        for _ in 0..2000 {
            cleft.step(&env, &mut sampler, None, &[]);
            env.step();
        }
        assert_eq!(cleft.concentration(&env, MoleculeId::Glutamate), 0.0);
        assert!(cleft.is_stable());
    }

    #[test]
    fn test_mass_conserved_without_enzymes() {
        let mut env = Environment::new();
        let mut cleft = SynapticCleft::new(&mut env, vec![MoleculeId::Glutamate], 0.0).unwrap();
        let dendrite = Dendrite::new(&mut env, Receptor::ampa(), 0.25, 25.0).unwrap();
        let dendrites = vec![dendrite];
        let config = SynapseConfig::default();
        let axon = Axon::new(&mut env, &config, ReleaseMode::Spiking).unwrap();
        let mut sampler = StochasticSampler::new(0, 0.0).unwrap();

        env.set(axon.reserve().env_id(), 4.0);
        cleft.deposit(&env, MoleculeId::Glutamate, 1.0);
        env.step();

        let before = cleft.total_concentration(&env)
            + dendrites[0].bound(&env)
            + axon.concentration(&env);

        for _ in 0..50 {
            // Binding only: the axon never steps, so nothing is released or
            // replenished.
            cleft.step(&env, &mut sampler, Some(&axon), &dendrites);
            env.step();
        }

        let after = cleft.total_concentration(&env)
            + dendrites[0].bound(&env)
            + axon.concentration(&env);
        assert_relative_eq!(after, before, epsilon = 1e-9);
    }

    #[test]
    fn test_reuptake_prefers_axon() {
        let mut env = Environment::new();
        let mut cleft = SynapticCleft::new(&mut env, vec![MoleculeId::Glutamate], 0.0).unwrap();
        let dendrite = Dendrite::new(&mut env, Receptor::ampa(), 0.25, 25.0).unwrap();
        let dendrites = vec![dendrite];
        let config = SynapseConfig::default();
        let axon = Axon::new(&mut env, &config, ReleaseMode::Spiking).unwrap();
        let mut sampler = StochasticSampler::new(0, 0.0).unwrap();

        // Drained axon: plenty of reuptake capacity.
        env.set(axon.reserve().env_id(), 1.0);
        cleft.deposit(&env, MoleculeId::Glutamate, 2.0);
        env.step();

        cleft.step(&env, &mut sampler, Some(&axon), &dendrites);
        env.step();

        let reclaimed = axon.concentration(&env) - 1.0;
        let bound = dendrites[0].bound(&env);
        assert!(reclaimed > 0.0);
        assert!(bound > 0.0);
        // The transporter outcompetes the quarter-density receptor.
        assert!(reclaimed > bound);
        assert!(axon.concentration(&env) <= axon.capacity() + 1e-9);
    }

    #[test]
    fn test_complex_mode_competition() {
        let mut env = Environment::new();
        let mut cleft = SynapticCleft::new(
            &mut env,
            vec![MoleculeId::Glutamate, MoleculeId::Gaba],
            0.0,
        )
        .unwrap();
        assert!(!cleft.is_simple());

        // An AMPA receptor antagonized by GABA: the antagonist competes for
        // receptor occupancy but never transfers onto the membrane.
        let mut receptor = Receptor::ampa();
        receptor.add_antagonist(MoleculeId::Gaba, 0.5).unwrap();
        let dendrite = Dendrite::new(&mut env, receptor, 0.5, 25.0).unwrap();
        let dendrites = vec![dendrite];
        let mut sampler = StochasticSampler::new(0, 0.0).unwrap();

        cleft.deposit(&env, MoleculeId::Glutamate, 1.0);
        cleft.deposit(&env, MoleculeId::Gaba, 1.0);
        env.step();

        cleft.step(&env, &mut sampler, None, &dendrites);
        env.step();

        // Glutamate bound; GABA stayed in the cleft.
        assert!(dendrites[0].bound(&env) > 0.0);
        assert_relative_eq!(
            cleft.concentration(&env, MoleculeId::Gaba),
            1.0,
            epsilon = 1e-12
        );
        assert!(cleft.concentration(&env, MoleculeId::Glutamate) < 1.0);
    }

    #[test]
    fn test_reuptake_inhibitor_slows_reclamation() {
        // GABA as a reuptake inhibitor on the glutamate transporter: it
        // competes for transporter occupancy without being transported.
        let reclaimed_with_gaba = |gaba: f64| {
            let mut env = Environment::new();
            let mut cleft = SynapticCleft::new(
                &mut env,
                vec![MoleculeId::Glutamate, MoleculeId::Gaba],
                0.0,
            )
            .unwrap();
            let mut transporter = neurochemistry::Transporter::glutamate();
            transporter
                .add_reuptake_inhibitor(MoleculeId::Gaba, 0.9)
                .unwrap();
            let config = SynapseConfig {
                transporter,
                ..SynapseConfig::default()
            };
            let axon = Axon::new(&mut env, &config, ReleaseMode::Spiking).unwrap();
            let mut sampler = StochasticSampler::new(0, 0.0).unwrap();

            env.set(axon.reserve().env_id(), 1.0);
            cleft.deposit(&env, MoleculeId::Glutamate, 1.0);
            if gaba > 0.0 {
                cleft.deposit(&env, MoleculeId::Gaba, gaba);
            }
            env.step();
            cleft.step(&env, &mut sampler, Some(&axon), &[]);
            env.step();
            axon.concentration(&env) - 1.0
        };

        let inhibited = reclaimed_with_gaba(5.0);
        let free = reclaimed_with_gaba(0.0);
        assert!(inhibited > 0.0);
        assert!(inhibited < free, "{inhibited} vs {free}");
    }

    #[test]
    fn test_antagonist_competition_reduces_binding() {
        // Same glutamate load, with and without a competing antagonist.
        let bound_with_gaba = |gaba: f64| {
            let mut env = Environment::new();
            let mut cleft = SynapticCleft::new(
                &mut env,
                vec![MoleculeId::Glutamate, MoleculeId::Gaba],
                0.0,
            )
            .unwrap();
            let mut receptor = Receptor::ampa();
            receptor.add_antagonist(MoleculeId::Gaba, 0.9).unwrap();
            let dendrite = Dendrite::new(&mut env, receptor, 0.5, 25.0).unwrap();
            let dendrites = vec![dendrite];
            let mut sampler = StochasticSampler::new(0, 0.0).unwrap();

            cleft.deposit(&env, MoleculeId::Glutamate, 1.0);
            if gaba > 0.0 {
                cleft.deposit(&env, MoleculeId::Gaba, gaba);
            }
            env.step();
            cleft.step(&env, &mut sampler, None, &dendrites);
            env.step();
            dendrites[0].bound(&env)
        };

        assert!(bound_with_gaba(5.0) < bound_with_gaba(0.0));
    }
}
