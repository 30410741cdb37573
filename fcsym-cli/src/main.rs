use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3};
use ndarray_npy::{read_npy, write_npy, WritableElement};

use fcsym::{BasisOptions, BasisSet, EigenOptions, FcOrder, SymmetryContext};
use fcsym::{LinearFCSolver, SolverOptions, TrainingData, recover};

mod errors;
use self::errors::Error;

mod sampling;
mod structure;

#[derive(Parser, Debug)]
#[command(name = "fcsym", about = "Symmetry-adapted force constants fitting")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print a table with the time spent in the different steps
    #[arg(long, global = true)]
    profile: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate random displacements of the atoms of a supercell
    Sample(SampleArgs),
    /// Build the force constants basis sets and report their sizes
    Basis(BasisArgs),
    /// Fit force constants to displacements and forces
    Fit(FitArgs),
}

#[derive(Args, Debug)]
struct SupercellArgs {
    /// JSON structure file, with `lattice`, `positions` (fractional), `types`
    /// and optional `operations`
    #[arg(long)]
    structure: PathBuf,
    /// Diagonal expansion of the structure into a supercell
    #[arg(long, num_args = 3, value_names = ["NA", "NB", "NC"], default_values_t = [1, 1, 1])]
    supercell: Vec<usize>,
    /// Tolerance when matching atomic positions under symmetry operations
    #[arg(long, default_value_t = fcsym::symmetry::DEFAULT_SYMPREC)]
    symprec: f64,
}

#[derive(Args, Debug)]
struct SampleArgs {
    #[command(flatten)]
    supercell: SupercellArgs,
    /// Number of random configurations
    #[arg(long, default_value_t = 10)]
    n_samples: usize,
    /// Length of the displacement of every atom
    #[arg(long, default_value_t = 0.03)]
    magnitude: f64,
    /// Also include the opposite of every displacement
    #[arg(long)]
    plus_minus: bool,
    /// Seed for the random number generator
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Output .npy file, with shape (n_samples, 3, n_atoms)
    #[arg(long, default_value = "displacements.npy")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct BasisParameters {
    /// Exclude atomic tuples with two atoms farther apart than this, for the
    /// third order force constants
    #[arg(long)]
    cutoff: Option<f64>,
    /// Number of batches of atoms used when building the sum rule operator
    #[arg(long)]
    n_batch: Option<usize>,
    /// Do not restrict the basis sets to the translational sum rule
    #[arg(long)]
    no_sum_rule: bool,
    /// Blocks of projectors up to this size use a dense eigensolver
    #[arg(long)]
    dense_threshold: Option<usize>,
    /// Only build the second order force constants basis
    #[arg(long)]
    fc2_only: bool,
}

#[derive(Args, Debug)]
struct BasisArgs {
    #[command(flatten)]
    supercell: SupercellArgs,
    #[command(flatten)]
    basis: BasisParameters,
}

#[derive(Args, Debug)]
struct FitArgs {
    #[command(flatten)]
    supercell: SupercellArgs,
    #[command(flatten)]
    basis: BasisParameters,
    /// Displacements .npy file, with shape (n_samples, 3, n_atoms)
    #[arg(long)]
    displacements: PathBuf,
    /// Forces .npy file, with shape (n_samples, 3, n_atoms)
    #[arg(long)]
    forces: PathBuf,
    /// Forces in the reference structure .npy file, with shape (3, n_atoms),
    /// subtracted from all the forces
    #[arg(long)]
    reference_forces: Option<PathBuf>,
    /// Number of samples used together when building the design matrix
    #[arg(long, default_value_t = 100)]
    batch_size: usize,
    /// Directory where fc2.npy (and fc3.npy) are written
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    if cli.profile {
        time_graph::enable_data_collection(true);
        time_graph::clear_collected_data();
    }

    let result = match cli.command {
        Command::Sample(args) => sample(&args),
        Command::Basis(args) => basis(&args),
        Command::Fit(args) => fit(&args),
    };

    if cli.profile {
        let graph = time_graph::get_full_graph();
        println!("{}", graph.as_short_table());
    }

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn factors(args: &SupercellArgs) -> Result<[usize; 3], Error> {
    match args.supercell.as_slice() {
        &[a, b, c] if a > 0 && b > 0 && c > 0 => Ok([a, b, c]),
        other => Err(Error::Input(format!(
            "supercell expansion must be three positive integers, got {:?}", other
        ))),
    }
}

fn sample(args: &SampleArgs) -> Result<(), Error> {
    let (supercell, _) = structure::load_supercell(&args.supercell.structure, factors(&args.supercell)?)?;
    if !(args.magnitude > 0.0) {
        return Err(Error::Input(format!("displacement magnitude must be positive, got {}", args.magnitude)));
    }

    let displacements = sampling::random_displacements(
        args.n_samples, supercell.size(), args.magnitude, args.plus_minus, args.seed
    );
    write(&args.output, &displacements)?;
    info!("wrote {} displaced configurations to '{}'", displacements.shape()[0], args.output.display());

    Ok(())
}

fn basis_options(parameters: &BasisParameters, order: FcOrder) -> BasisOptions {
    let mut eigen = EigenOptions::default();
    if let Some(dense_threshold) = parameters.dense_threshold {
        eigen.dense_threshold = dense_threshold;
    }

    BasisOptions {
        cutoff: if order == FcOrder::Third { parameters.cutoff } else { None },
        apply_sum_rule: !parameters.no_sum_rule,
        n_batch: parameters.n_batch,
        coset_factor: None,
        eigen: eigen,
    }
}

fn build_bases(ctx: &SymmetryContext<'_>, parameters: &BasisParameters) -> Result<(BasisSet, Option<BasisSet>), Error> {
    let fc2 = BasisSet::new(ctx, FcOrder::Second, basis_options(parameters, FcOrder::Second))?;
    let fc3 = if parameters.fc2_only {
        None
    } else {
        Some(BasisSet::new(ctx, FcOrder::Third, basis_options(parameters, FcOrder::Third))?)
    };

    return Ok((fc2, fc3));
}

fn basis(args: &BasisArgs) -> Result<(), Error> {
    let (supercell, operations) = structure::load_supercell(&args.supercell.structure, factors(&args.supercell)?)?;
    let ctx = SymmetryContext::new(&supercell, operations.as_ref(), args.supercell.symprec)?;

    let (fc2, fc3) = build_bases(&ctx, &args.basis)?;
    for basis in std::iter::once(&fc2).chain(fc3.as_ref()) {
        println!(
            "{}: {} basis vectors ({} before the sum rule, compact dimension {})",
            basis.order(), basis.dimension(), basis.compression_matrix().cols(), basis.compressor().dimension()
        );
    }

    Ok(())
}

fn fit(args: &FitArgs) -> Result<(), Error> {
    let (supercell, operations) = structure::load_supercell(&args.supercell.structure, factors(&args.supercell)?)?;
    let n_atoms = supercell.size();

    let displacements = read::<Array3<f64>>(&args.displacements)?;
    let forces = read::<Array3<f64>>(&args.forces)?;
    let reference = match &args.reference_forces {
        Some(path) => Some(read::<Array2<f64>>(path)?),
        None => None,
    };

    let data = training_data(
        displacements.view(),
        forces.view(),
        reference.as_ref().map(|reference| reference.view()),
        n_atoms,
    )?;
    info!("loaded {} training samples", data.n_samples());

    let ctx = SymmetryContext::new(&supercell, operations.as_ref(), args.supercell.symprec)?;
    let (fc2_basis, fc3_basis) = build_bases(&ctx, &args.basis)?;

    let solver = LinearFCSolver::new(SolverOptions {
        batch_size: args.batch_size,
        ..SolverOptions::default()
    })?;
    let coefficients = solver.solve(&data, &fc2_basis, fc3_basis.as_ref())?;

    std::fs::create_dir_all(&args.output_dir).map_err(|error| Error::Io {
        path: args.output_dir.clone(),
        error,
    })?;

    let fc2 = recover(&fc2_basis, coefficients.fc2.view())?;
    let path = args.output_dir.join("fc2.npy");
    write(&path, &fc2.into_values())?;
    info!("wrote second order force constants to '{}'", path.display());

    if let (Some(basis), Some(values)) = (&fc3_basis, &coefficients.fc3) {
        let fc3 = recover(basis, values.view())?;
        let path = args.output_dir.join("fc3.npy");
        write(&path, &fc3.into_values())?;
        info!("wrote third order force constants to '{}'", path.display());
    }

    Ok(())
}

/// Build the training data from `(n_samples, 3, n_atoms)` displacements and
/// forces, and `(3, n_atoms)` forces of the reference structure
fn training_data(
    displacements: ArrayView3<'_, f64>,
    forces: ArrayView3<'_, f64>,
    reference: Option<ArrayView2<'_, f64>>,
    n_atoms: usize,
) -> Result<TrainingData, fcsym::Error> {
    let (n_samples, _, atoms) = displacements.dim();
    if atoms != n_atoms {
        return Err(fcsym::Error::ShapeMismatch {
            context: "training displacements".into(),
            expected: vec![n_samples, 3, n_atoms],
            got: displacements.shape().to_vec(),
        });
    }

    let data = TrainingData::from_components(displacements, forces)?;

    match reference {
        Some(reference) => {
            if reference.shape() != [3, n_atoms] {
                return Err(fcsym::Error::ShapeMismatch {
                    context: "reference forces".into(),
                    expected: vec![3, n_atoms],
                    got: reference.shape().to_vec(),
                });
            }

            let reference = Array1::from_shape_fn(3 * n_atoms, |i| reference[[i % 3, i / 3]]);
            data.with_reference_forces(reference.view())
        }
        None => Ok(data),
    }
}

fn read<T>(path: &Path) -> Result<T, Error> where T: ndarray_npy::ReadNpyExt {
    read_npy(path).map_err(|error| Error::ReadNpy {
        path: path.to_owned(),
        error,
    })
}

fn write<A, S, D>(path: &Path, array: &ndarray::ArrayBase<S, D>) -> Result<(), Error>
where
    A: WritableElement,
    S: ndarray::Data<Elem = A>,
    D: ndarray::Dimension,
{
    write_npy(path, array).map_err(|error| Error::WriteNpy {
        path: path.to_owned(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn components_layout() {
        // two samples, two atoms
        let displacements = Array3::from_shape_fn((2, 3, 2), |(s, a, j)| (s * 100 + 10 * a + j) as f64);
        let forces = -&displacements;
        let reference = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];

        let data = training_data(displacements.view(), forces.view(), Some(reference.view()), 2).unwrap();
        assert_eq!(data.n_samples(), 2);
        assert_eq!(data.n_atoms(), 2);

        // displacements are stored atom-major: x, y, z of atom 0 first
        assert_relative_eq!(data.displacements().row(1), array![100.0, 110.0, 120.0, 101.0, 111.0, 121.0].view());
        assert_relative_eq!(data.forces().row(0), array![-1.0, -13.0, -25.0, -3.0, -15.0, -27.0].view());
    }

    #[test]
    fn wrong_layout() {
        // (n_samples, n_atoms, 3) instead of (n_samples, 3, n_atoms)
        let atoms_first = Array3::<f64>::zeros((2, 4, 3));
        let result = training_data(atoms_first.view(), atoms_first.view(), None, 4);
        assert!(matches!(result, Err(fcsym::Error::ShapeMismatch { .. })));

        let displacements = Array3::<f64>::zeros((2, 3, 4));
        let forces = Array3::<f64>::zeros((3, 3, 4));
        let result = training_data(displacements.view(), forces.view(), None, 4);
        assert!(matches!(result, Err(fcsym::Error::ShapeMismatch { .. })));

        let reference = Array2::<f64>::zeros((4, 3));
        let result = training_data(displacements.view(), displacements.view(), Some(reference.view()), 4);
        assert!(matches!(result, Err(fcsym::Error::ShapeMismatch { .. })));
    }
}
