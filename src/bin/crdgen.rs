//! Prints every CRD the operator serves as a multi-document YAML stream,
//! ready for `kubectl apply -f -`. The Traefik `Middleware` kind is not
//! included; its definition is shipped by Traefik itself.

use anyhow::Result;
use kube::CustomResourceExt;

use stack_operator::crd::{
    AuthClient, AuthComponent, AuthScope, BenthosServer, BenthosStream, Configuration,
    ControlComponent, LedgerComponent, PaymentsComponent, SearchComponent, SearchIngester, Stack,
    WebhooksComponent,
};

fn main() -> Result<()> {
    let crds = [
        serde_yaml::to_string(&Configuration::crd())?,
        serde_yaml::to_string(&Stack::crd())?,
        serde_yaml::to_string(&AuthComponent::crd())?,
        serde_yaml::to_string(&LedgerComponent::crd())?,
        serde_yaml::to_string(&PaymentsComponent::crd())?,
        serde_yaml::to_string(&SearchComponent::crd())?,
        serde_yaml::to_string(&WebhooksComponent::crd())?,
        serde_yaml::to_string(&ControlComponent::crd())?,
        serde_yaml::to_string(&BenthosServer::crd())?,
        serde_yaml::to_string(&BenthosStream::crd())?,
        serde_yaml::to_string(&SearchIngester::crd())?,
        serde_yaml::to_string(&AuthScope::crd())?,
        serde_yaml::to_string(&AuthClient::crd())?,
    ];
    print!("{}", crds.join("---\n"));
    Ok(())
}
