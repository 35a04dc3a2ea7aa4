// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Build customized Firefox ESR installer packages.

The [pipeline::Pipeline] type drives a packaging run from a
[config::PackagerConfig]. External work is performed through small traits
so each collaborator can be swapped out:

* [extract::SetupExtractor] unpacks the vendor installer.
* [pipeline::VersionSource] reads version metadata from the unpacked tree.
* [publish::TreePublisher] copies finished packages to a content store.
* [registrar::DeploymentRegistrar] registers packages with a systems
  management console.
*/

pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod publish;
pub mod registrar;
