// SPDX-License-Identifier: MIT

//! Profile-aware validation.
//!
//! Every document type checks its own structure through `valid()`. The
//! [`Validator`] adds the profile layer: it walks the tree depth-first and at
//! each extension point checks the mandatory fields the profile declares there
//! and runs the profile's constraints. Errors carry the path to the failing
//! node, e.g. `tag at index 0, triples, reference value at index 3,
//! measurement at index 0: ...`.

use std::sync::Arc;

use tracing::trace;

use crate::{
    get_profile_manifest, Comid, ConciseEvidence, ExtensionMap, ExtensionPoint, ExtensionTarget,
    Measurement, ProfileId, ProfileManifest, Result, ResultExt, Signer, Tag, Triples,
    UnsignedCorim, ValueTriple,
};

/// Validates documents against an optional profile.
#[derive(Clone, Default)]
pub struct Validator {
    manifest: Option<Arc<ProfileManifest>>,
}

impl Validator {
    pub fn new(manifest: Option<Arc<ProfileManifest>>) -> Self {
        Self { manifest }
    }

    /// A validator for the given profile; structural checks only when the
    /// profile is absent or not registered.
    pub fn for_profile(id: Option<&ProfileId>) -> Self {
        Self::new(id.and_then(get_profile_manifest))
    }

    pub fn manifest(&self) -> Option<&ProfileManifest> {
        self.manifest.as_deref()
    }

    pub fn corim(&self, corim: &UnsignedCorim) -> Result<()> {
        corim.valid_structure()?;

        let Some(manifest) = self.manifest() else {
            return Ok(());
        };
        trace!(profile = %manifest.id, "validating CoRIM against profile");

        self.node(&corim.extensions, ExtensionTarget::UnsignedCorim(corim))?;

        for (i, entity) in corim.entities.iter().enumerate() {
            self.node(&entity.extensions, ExtensionTarget::CorimEntity(entity))
                .with_context(|| format!("entity at index {i}"))?;
        }

        for (i, tag) in corim.tags.iter().enumerate() {
            if let Tag::Comid(comid) = tag {
                self.walk_comid(comid)
                    .with_context(|| format!("tag at index {i}"))?;
            }
        }

        Ok(())
    }

    pub fn comid(&self, comid: &Comid) -> Result<()> {
        comid.valid()?;
        self.walk_comid(comid)
    }

    pub fn signer(&self, signer: &Signer) -> Result<()> {
        signer.valid()?;
        self.node(&signer.extensions, ExtensionTarget::Signer(signer))
    }

    pub fn evidence(&self, evidence: &ConciseEvidence) -> Result<()> {
        evidence.valid_structure()?;

        if self.manifest.is_none() {
            return Ok(());
        }

        let triples = &evidence.triples;
        self.node(&triples.extensions, ExtensionTarget::EvidenceTriples(triples))
            .context("ev-triples")?;

        for (i, triple) in triples.evidence_triples.iter().enumerate() {
            self.measurements(&triple.measurements, None)
                .with_context(|| format!("ev-triples, evidence triple at index {i}"))?;
        }

        Ok(())
    }

    fn walk_comid(&self, comid: &Comid) -> Result<()> {
        self.node(&comid.extensions, ExtensionTarget::Comid(comid))?;

        for (i, entity) in comid.entities.iter().enumerate() {
            self.node(&entity.extensions, ExtensionTarget::ComidEntity(entity))
                .with_context(|| format!("entity at index {i}"))?;
        }

        self.triples(&comid.triples).context("triples")
    }

    fn triples(&self, triples: &Triples) -> Result<()> {
        for (i, triple) in triples.reference_values.iter().enumerate() {
            self.value_triple(triple, ExtensionTarget::ReferenceValue(triple))
                .with_context(|| format!("reference value at index {i}"))?;
        }

        for (i, triple) in triples.endorsed_values.iter().enumerate() {
            self.value_triple(triple, ExtensionTarget::EndorsedValue(triple))
                .with_context(|| format!("endorsed value at index {i}"))?;
        }

        self.node(&triples.extensions, ExtensionTarget::Triples(triples))
    }

    fn value_triple(&self, triple: &ValueTriple, target: ExtensionTarget<'_>) -> Result<()> {
        self.measurements(&triple.measurements, Some(target.point()))?;

        match self.manifest() {
            Some(manifest) => manifest.constrain(&target),
            None => Ok(()),
        }
    }

    /// Checks the measurement values of a triple. `point` names the triple's
    /// own extension point, whose fields live in each value's extension map.
    fn measurements(&self, measurements: &[Measurement], point: Option<ExtensionPoint>) -> Result<()> {
        let Some(manifest) = self.manifest() else {
            return Ok(());
        };

        let flags_point = match point {
            Some(ExtensionPoint::ReferenceValue) => Some(ExtensionPoint::ReferenceValueFlags),
            Some(ExtensionPoint::EndorsedValue) => Some(ExtensionPoint::EndorsedValueFlags),
            _ => None,
        };

        for (i, measurement) in measurements.iter().enumerate() {
            let mval = &measurement.value;
            let check = || -> Result<()> {
                let mut fields = manifest.fields(ExtensionPoint::Mval);
                if let Some(point) = point {
                    fields.extend(manifest.fields(point));
                }
                mval.extensions.check(&fields)?;
                manifest.constrain(&ExtensionTarget::Mval(mval))?;

                if let (Some(flags_point), Some(flags)) = (flags_point, &mval.flags) {
                    flags.extensions.check(&manifest.fields(flags_point))?;
                    let target = match flags_point {
                        ExtensionPoint::ReferenceValueFlags => {
                            ExtensionTarget::ReferenceValueFlags(flags)
                        }
                        _ => ExtensionTarget::EndorsedValueFlags(flags),
                    };
                    manifest.constrain(&target).context("flags")?;
                }

                Ok(())
            };

            check().with_context(|| format!("measurement at index {i}"))?;
        }

        Ok(())
    }

    /// Mandatory fields and constraints of one extension point.
    fn node(&self, extensions: &ExtensionMap, target: ExtensionTarget<'_>) -> Result<()> {
        let Some(manifest) = self.manifest() else {
            return Ok(());
        };

        extensions.check(&manifest.fields(target.point()))?;
        manifest.constrain(&target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        register_profile, test, Error, Extension, ExtensionField, FieldExtension, FieldKind,
        HashAlgorithm, HashEntry, Mval,
    };

    struct NoEndorsements;

    impl Extension for NoEndorsements {
        fn constrain(&self, target: &ExtensionTarget<'_>) -> Result<()> {
            match target {
                ExtensionTarget::Triples(t) if !t.endorsed_values.is_empty() => {
                    Err(Error::validation("endorsed values are not allowed"))
                }
                _ => Ok(()),
            }
        }
    }

    fn corim_with_profile(id: &ProfileId) -> UnsignedCorim {
        let mut corim = test::minimal_corim().with_profile(id.clone());
        if let Some(Tag::Comid(comid)) = corim.tags.first_mut() {
            comid.add_endorsed_value(
                crate::Environment::from_class_id(crate::ClassId::Int(7)),
                vec![Measurement::new(
                    Mval::new().with_digest(HashEntry::new(HashAlgorithm::SHA256, [1; 32])),
                )],
            );
        }
        corim
    }

    #[test]
    fn test_structural_only_without_profile() {
        let corim = corim_with_profile(&ProfileId::uri("http://example.com/not-registered"));
        Validator::for_profile(corim.profile.as_ref())
            .corim(&corim)
            .unwrap();
        corim.valid().unwrap();
    }

    #[test]
    fn test_triples_constraint_carries_path() {
        let id = ProfileId::uri("http://example.com/validate-no-endorsements");
        register_profile(
            ProfileManifest::new(id.clone())
                .with_extension(ExtensionPoint::Triples, Arc::new(NoEndorsements))
                .unwrap(),
        )
        .unwrap();

        let corim = corim_with_profile(&id);
        assert_eq!(
            corim.valid().unwrap_err().to_string(),
            "tag at index 0, triples: endorsed values are not allowed"
        );
    }

    #[test]
    fn test_mandatory_mval_field() {
        let id = ProfileId::uri("http://example.com/validate-mandatory-mval");
        let field = ExtensionField::new(-70, "rank", FieldKind::uint()).mandatory();
        register_profile(
            ProfileManifest::new(id.clone())
                .with_extension(
                    ExtensionPoint::EndorsedValue,
                    Arc::new(FieldExtension::new(vec![field.clone()])),
                )
                .unwrap(),
        )
        .unwrap();

        let mut corim = corim_with_profile(&id);
        assert_eq!(
            corim.valid().unwrap_err().to_string(),
            "tag at index 0, triples, endorsed value at index 0, measurement at index 0: \
             missing mandatory field \"rank\" (-70)"
        );

        corim.comids_mut().for_each(|c| {
            for triple in &mut c.triples.endorsed_values {
                for m in &mut triple.measurements {
                    m.value.extensions.set(&field, &3u64).unwrap();
                }
            }
        });
        corim.valid().unwrap();
    }

    #[test]
    fn test_structural_errors_come_first() {
        let id = ProfileId::uri("http://example.com/not-registered-either");
        let mut corim = corim_with_profile(&id);
        corim.id = crate::TagId::from("");
        assert_eq!(
            Validator::for_profile(Some(&id)).corim(&corim).unwrap_err().to_string(),
            "corim-id: empty tag id"
        );
    }
}
