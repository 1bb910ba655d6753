//! Example: a two-cell retinal chain under a light stimulus.
//!
//! A photoreceptor releases GABA onto a ganglion cell through a full
//! chemical synapse. In darkness the photoreceptor sits depolarized and
//! releases continuously; light pulses hyperpolarize it and lift the
//! inhibition on the ganglion cell.

use engine::{
    ActivationPulseDriver, Engine, NeuronConfig, ProbeKind, ProbeTarget, SynapseConfig,
};
use neurochemistry::MoleculeId;

fn main() -> anyhow::Result<()> {
    println!("Retina chain: photoreceptor -> GABA synapse -> ganglion");
    println!("=======================================================\n");

    let mut engine = Engine::new(1);

    let photo = engine.create_neuron(
        &NeuronConfig::photoreceptor()
            .with_light_tau(10.0)
            .with_record(true),
    )?;
    let ganglion = engine.create_neuron(&NeuronConfig::ganglion().with_record(true))?;

    let synapse = engine.create_synapse(
        photo,
        ganglion,
        &SynapseConfig::gabaergic().with_enzyme_concentration(0.5),
    )?;

    // 60-tick light pulses every 200 ticks, after a dark adaptation phase.
    engine.register_driver(
        photo,
        Box::new(ActivationPulseDriver::new(0.7, 200, 60, 300).with_record()),
        Some("light"),
    )?;
    engine.attach_probe(
        "cleft_gaba",
        ProbeTarget::Synapse(synapse),
        ProbeKind::CleftConcentration(MoleculeId::Gaba),
    )?;
    engine.attach_probe("post_v", ProbeTarget::Neuron(ganglion), ProbeKind::Voltage)?;

    let ticks = 1000;
    engine.step(ticks)?;

    let light = engine.driver_data("light")?;
    let photo_v = engine.voltage_record(photo);
    let gaba = engine.probe_data("cleft_gaba")?;

    println!("{:>6} {:>8} {:>12} {:>12}", "tick", "light", "photo (mV)", "cleft GABA");
    for t in (0..ticks).step_by(50) {
        println!(
            "{:>6} {:>8.2} {:>12.2} {:>12.4}",
            t, light[t], photo_v[t], gaba[t]
        );
    }

    let dark_release: f64 = gaba[200..300].iter().sum::<f64>() / 100.0;
    let lit_release: f64 = gaba[320..360].iter().sum::<f64>() / 40.0;
    println!("\nMean cleft GABA, dark adaptation: {dark_release:.4}");
    println!("Mean cleft GABA, first light pulse: {lit_release:.4}");

    engine.close();
    Ok(())
}
