use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = clusterscan_operator::crds::ClusterScan::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
