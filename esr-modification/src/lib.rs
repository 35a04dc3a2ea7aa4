// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Declarative modifications of an extracted installer tree.

A modifications manifest is an XML document listing file level operations:

```xml
<modifications>
    <replaceFile>
        <source>files/policies.json</source>
        <target>distribution/policies.json</target>
    </replaceFile>
    <replaceString>
        <file>core/defaults/pref/channel-prefs.js</file>
        <source>"release"</source>
        <target>#Version#</target>
    </replaceString>
</modifications>
```

[Manifest] parses such a document into an ordered list of [Operation].
[execute] applies a single operation and [apply] applies a whole manifest,
recording an [ExecutionOutcome] for every operation. A failing operation
never prevents later operations from running.
*/

mod engine;
mod executor;
mod manifest;

pub use {
    engine::{apply, ModificationReport},
    executor::{execute, ExecutionContext, ExecutionOutcome, OperationError, OperationStatus},
    manifest::{Manifest, ManifestError, Operation, Replacement, VERSION_PLACEHOLDER},
};
