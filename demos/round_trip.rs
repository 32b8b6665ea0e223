//! Example: encode a message, damage it, and decode it both ways.
//!
//! Run with:
//! `cargo run --example round_trip`

use basecodec::{
    codes, encoder, BitOrder, BitPacker, Decoder, InputModel, MatrixBuilder, MutatorParams,
    SubState, SymbolSink,
};

fn main() -> basecodec::Result<()> {
    let machine = codes::rotating_code(2)?;
    let message = b"ACGT storage";
    let seq = encoder::encode_bytes(&machine, message, BitOrder::Msb0)?;
    println!("Encoded {} bytes as {} bases:", message.len(), seq.len());
    println!("  {seq}");

    // Clean channel: the closure decoder streams bytes straight out.
    let mut bytes = Vec::new();
    {
        let mut packer = BitPacker::new(&mut bytes, BitOrder::Msb0);
        let mut decoder = Decoder::new(&machine, &mut packer)?;
        decoder.decode_str(&seq)?;
        if let Some(unresolved) = decoder.close()? {
            println!("{unresolved}");
        }
    }
    println!("Closure decoder: {:?}", String::from_utf8_lossy(&bytes));

    // Noisy channel: duplicate two bases and drop one further on.
    let mut noisy: Vec<char> = seq.chars().collect();
    let copy: Vec<char> = noisy[10..12].to_vec();
    noisy.splice(12..12, copy);
    noisy.remove(40);
    let noisy: String = noisy.into_iter().collect();
    println!("Damaged sequence ({} bases):", noisy.len());
    println!("  {noisy}");

    let mut builder = MatrixBuilder::new(&machine)
        .with_input_model(InputModel::from_machine(&machine, 0.0)?)
        .with_mutator(MutatorParams::default());
    let vm = builder.build(&noisy)?;
    println!("Best path log-likelihood: {:.3}", vm.loglike());
    for cell in vm.alignment()?.iter().filter(|c| c.sub != SubState::Plain) {
        println!(
            "  pos = {:3}, state = {:>3}, {}",
            cell.pos,
            machine.state_name(cell.state),
            cell.sub
        );
    }

    let mut recovered = Vec::new();
    {
        let mut packer = BitPacker::new(&mut recovered, BitOrder::Msb0);
        for sym in vm.traceback()? {
            packer.write_symbol(sym)?;
        }
        packer.finish()?;
    }
    println!("Viterbi decoder: {:?}", String::from_utf8_lossy(&recovered));
    Ok(())
}
