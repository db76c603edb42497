use crd_api::Backup;
use kube::CustomResourceExt;

fn main() {
    let crd = Backup::crd();
    print!("{}", serde_yaml::to_string(&crd).expect("failed to serialize Backup CRD to YAML"));
}
