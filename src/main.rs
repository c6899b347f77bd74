use ndarray::Array2;
use rsb::{autotune, make_matrix, multiply, random_matrix, wall_time, EngineContext, TuneOptions};

fn main() -> rsb::Result<()> {
    println!("RSB: Recursive Sparse Blocks (version {})", rsb::VERSION);

    let ctx = EngineContext::with_defaults()?;
    println!("Engine context: {} workers", ctx.worker_count());

    // Create a simple example matrix
    let a = make_matrix(
        vec![0, 0, 1, 2, 2],
        vec![0, 1, 1, 0, 2],
        vec![1.0f64, 2.0, 3.0, 4.0, 5.0],
        (3, 3),
        false,
    )?;

    println!("\nMatrix A:");
    print!("{}", a);

    let x = Array2::from_elem((3, 1), 1.0);
    let y = multiply(&ctx, &a, x.view())?;
    println!("\nA * ones = {:?}", y.into_raw_vec());

    // A larger random matrix, tuned before repeated use
    let n = 2000;
    let t = random_matrix::<f64>(n, n, 0.005, 42)?;
    let mut b = rsb::RsbMatrix::from_triplets(&t, (n, n), rsb::SymmetryMode::General)?;

    println!("\nRandom matrix:");
    print!("{}", b);

    let start = wall_time();
    let report = autotune(&ctx, &mut b, &TuneOptions::default())?;
    println!(
        "\nAutotune ({:.3} s): {:?}, leaf_threshold {} threads {} ({:.3e} nnz/s, baseline {:.3e})",
        wall_time() - start,
        report.status,
        report.profile.leaf_threshold,
        report.profile.thread_count,
        report.profile.throughput,
        report.baseline
    );
    println!("Leaves after tuning: {}", b.leaf_count());

    ctx.shutdown();
    Ok(())
}
