#![cfg_attr(not(feature = "std"), no_std, no_main)]

/// # Asset Registry
///
/// Minimal ownership ledger for the gallery collection.  It answers exactly
/// one question — who owns asset `id` right now — and accepts mutations from
/// exactly one caller: the bound Gallery Pool contract.
///
/// There is deliberately no approval machinery, no metadata and no free
/// transfer path.  Every asset moves through the Gallery Pool marketplace,
/// which is the only account permitted to call `mint`, `transfer` and
/// `mark_all_destroyed`.
///
/// After `mark_all_destroyed` the collection is sealed: no further mints or
/// transfers.  `owner_of` keeps answering with the owner of record at
/// destruction time — the Gallery Pool's distribution scan depends on that
/// to refund each asset's cost basis to its final holder.
#[ink::contract]
mod asset_registry {
    use ink::storage::Mapping;

    // =========================================================================
    // STORAGE
    // =========================================================================

    #[ink(storage)]
    pub struct AssetRegistry {
        /// Deployer; may bind the gallery exactly once.
        admin: AccountId,

        /// The Gallery Pool contract.  Sole authorised mutator.
        gallery: Option<AccountId>,

        /// Asset id → current owner.  Absent = unminted.
        owners: Mapping<u32, AccountId>,

        /// Count of minted assets.
        minted: u32,

        /// Set once by `mark_all_destroyed`; never cleared.
        destroyed: bool,

        /// Timestamp of the destruction event (0 while alive).
        destroyed_at: Timestamp,
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    #[ink(event)]
    pub struct GalleryBound {
        #[ink(topic)]
        gallery: AccountId,
    }

    #[ink(event)]
    pub struct AssetMinted {
        #[ink(topic)]
        asset_id: u32,
        owner: AccountId,
    }

    #[ink(event)]
    pub struct AssetTransferred {
        #[ink(topic)]
        asset_id: u32,
        from: AccountId,
        to: AccountId,
    }

    /// The whole collection was marked destroyed.  Ownership records survive
    /// as a frozen snapshot.
    #[ink(event)]
    pub struct CollectionDestroyed {
        minted: u32,
        at: Timestamp,
    }

    // =========================================================================
    // ERRORS
    // =========================================================================

    #[derive(Debug, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(feature = "std", derive(scale_info::TypeInfo))]
    pub enum Error {
        /// Caller is not the registry admin.
        NotAdmin,
        /// Caller is not the bound Gallery Pool.
        NotGallery,
        /// A gallery has already been bound; the binding is one-shot.
        GalleryAlreadyBound,
        /// No gallery has been bound yet.
        NoGalleryBound,
        /// The asset id has no owner record.
        NotMinted,
        /// The asset id already has an owner record.
        AlreadyMinted,
        /// `from` does not match the current owner.
        WrongOwner,
        /// The collection is sealed; no further mints or transfers.
        Destroyed,
        /// `mark_all_destroyed` was already executed.
        AlreadyDestroyed,
    }

    // =========================================================================
    // IMPLEMENTATION
    // =========================================================================

    impl AssetRegistry {
        #[ink(constructor)]
        pub fn new() -> Self {
            Self {
                admin: Self::env().caller(),
                gallery: None,
                owners: Mapping::default(),
                minted: 0,
                destroyed: false,
                destroyed_at: 0,
            }
        }

        /// Bind the Gallery Pool.  One-shot: once bound, the authority over
        /// this registry can never be moved again.
        #[ink(message)]
        pub fn set_gallery(&mut self, gallery: AccountId) -> Result<(), Error> {
            if self.env().caller() != self.admin {
                return Err(Error::NotAdmin);
            }
            if self.gallery.is_some() {
                return Err(Error::GalleryAlreadyBound);
            }
            self.gallery = Some(gallery);
            self.env().emit_event(GalleryBound { gallery });
            Ok(())
        }

        // =====================================================================
        // CAPABILITY INTERFACE — Gallery Pool only
        // =====================================================================

        #[ink(message)]
        pub fn mint(&mut self, to: AccountId, asset_id: u32) -> Result<(), Error> {
            self.only_gallery()?;
            if self.destroyed {
                return Err(Error::Destroyed);
            }
            if self.owners.contains(asset_id) {
                return Err(Error::AlreadyMinted);
            }
            self.owners.insert(asset_id, &to);
            self.minted = self.minted.saturating_add(1);
            self.env().emit_event(AssetMinted { asset_id, owner: to });
            Ok(())
        }

        #[ink(message)]
        pub fn transfer(
            &mut self,
            from: AccountId,
            to: AccountId,
            asset_id: u32,
        ) -> Result<(), Error> {
            self.only_gallery()?;
            if self.destroyed {
                return Err(Error::Destroyed);
            }
            let owner = self.owners.get(asset_id).ok_or(Error::NotMinted)?;
            if owner != from {
                return Err(Error::WrongOwner);
            }
            self.owners.insert(asset_id, &to);
            self.env().emit_event(AssetTransferred { asset_id, from, to });
            Ok(())
        }

        /// Seal the collection.  Ownership records are frozen, not erased.
        #[ink(message)]
        pub fn mark_all_destroyed(&mut self) -> Result<(), Error> {
            self.only_gallery()?;
            if self.destroyed {
                return Err(Error::AlreadyDestroyed);
            }
            self.destroyed = true;
            self.destroyed_at = self.env().block_timestamp();
            self.env().emit_event(CollectionDestroyed {
                minted: self.minted,
                at: self.destroyed_at,
            });
            Ok(())
        }

        // =====================================================================
        // VIEW FUNCTIONS
        // =====================================================================

        #[ink(message)]
        pub fn owner_of(&self, asset_id: u32) -> Result<AccountId, Error> {
            self.owners.get(asset_id).ok_or(Error::NotMinted)
        }

        #[ink(message)]
        pub fn is_destroyed(&self) -> bool {
            self.destroyed
        }

        #[ink(message)]
        pub fn destroyed_at(&self) -> Timestamp {
            self.destroyed_at
        }

        #[ink(message)]
        pub fn total_minted(&self) -> u32 {
            self.minted
        }

        #[ink(message)]
        pub fn gallery(&self) -> Option<AccountId> {
            self.gallery
        }

        // =====================================================================
        // ACCESS CONTROL
        // =====================================================================

        fn only_gallery(&self) -> Result<(), Error> {
            let gallery = self.gallery.ok_or(Error::NoGalleryBound)?;
            if self.env().caller() != gallery {
                return Err(Error::NotGallery);
            }
            Ok(())
        }
    }

    // =========================================================================
    // UNIT TESTS
    // =========================================================================

}
