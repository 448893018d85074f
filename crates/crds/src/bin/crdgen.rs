//! Prints the Function CRD as YAML so it can be applied with `kubectl apply -f -`.

use crds::Function;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&Function::crd())?);
    Ok(())
}
